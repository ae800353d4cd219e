//! Blob sources on disk.

use std::path::Path;

use kiln_core::Blob;

use crate::error::{DeployError, Result};

/// Read a whole blob into memory. Runs before any host call.
pub fn read_blob(blob: Blob, path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| DeployError::SourceUnreadable {
        blob,
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(DeployError::EmptySource { blob });
    }
    tracing::debug!(%blob, path = %path.display(), bytes = bytes.len(), "read blob source");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.bin");
        match read_blob(Blob::Model, &path) {
            Err(DeployError::SourceUnreadable { blob, path: p, .. }) => {
                assert_eq!(blob, Blob::Model);
                assert_eq!(p, path);
            }
            other => panic!("expected SourceUnreadable, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tok.bin");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            read_blob(Blob::Tokenizer, &path),
            Err(DeployError::EmptySource { blob: Blob::Tokenizer })
        ));
    }

    #[test]
    fn test_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tok.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert_eq!(read_blob(Blob::Tokenizer, &path).unwrap(), vec![1, 2, 3]);
    }
}

//! llama2.c model header: the 7-field config that prefixes every model file.
//!
//! Layout:
//! ```text
//! ┌──────────────────────────────────┐
//! │ dim          i32 LE              │
//! │ hidden_dim   i32 LE              │
//! │ n_layers     i32 LE              │
//! │ n_heads      i32 LE              │
//! │ n_kv_heads   i32 LE              │
//! │ vocab_size   i32 LE (signed!)    │
//! │ seq_len      i32 LE              │
//! ├──────────────────────────────────┤
//! │ Weight blob (f32, fixed order)   │
//! └──────────────────────────────────┘
//! ```
//!
//! The sign of `vocab_size` is an out-of-band flag owned by the inference
//! engine (llama2.c uses a negative value for "classifier not shared with the
//! embedding table"). It is split off at decode time so no size computation
//! ever sees a negative number.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Number of i32 fields in the header.
pub const HEADER_FIELDS: usize = 7;

/// Size of the header in bytes.
pub const HEADER_BYTES: usize = HEADER_FIELDS * 4;

const FIELD_NAMES: [&str; HEADER_FIELDS] = [
    "dim",
    "hidden_dim",
    "n_layers",
    "n_heads",
    "n_kv_heads",
    "vocab_size",
    "seq_len",
];

/// Vocabulary size as stored: magnitude plus the sign flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabSize {
    pub magnitude: u32,
    /// Set when the stored value was negative.
    pub flag: bool,
}

impl VocabSize {
    pub fn from_raw(raw: i32) -> Self {
        Self {
            magnitude: raw.unsigned_abs(),
            flag: raw < 0,
        }
    }

    /// Re-encode into the signed on-disk form.
    pub fn to_raw(self) -> i32 {
        let m = self.magnitude as i32;
        if self.flag { m.wrapping_neg() } else { m }
    }
}

/// Decoded model dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub dim: u32,
    pub hidden_dim: u32,
    pub n_layers: u32,
    pub n_heads: u32,
    pub n_kv_heads: u32,
    pub vocab: VocabSize,
    pub seq_len: u32,
}

impl ModelConfig {
    /// Decode the header from the start of `data`. Trailing bytes (the weight
    /// blob) are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MalformedHeader> {
        if data.len() < HEADER_BYTES {
            return Err(MalformedHeader::Truncated { got: data.len() });
        }

        let mut raw = [0i32; HEADER_FIELDS];
        for (i, field) in raw.iter_mut().enumerate() {
            let b = &data[i * 4..i * 4 + 4];
            *field = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        }

        // vocab_size (index 5) may be negative; everything else must be positive.
        for (i, &value) in raw.iter().enumerate() {
            let value_ok = if i == 5 { value != 0 } else { value > 0 };
            if !value_ok {
                return Err(MalformedHeader::NonPositive { field: FIELD_NAMES[i], value });
            }
        }

        Ok(Self {
            dim: raw[0] as u32,
            hidden_dim: raw[1] as u32,
            n_layers: raw[2] as u32,
            n_heads: raw[3] as u32,
            n_kv_heads: raw[4] as u32,
            vocab: VocabSize::from_raw(raw[5]),
            seq_len: raw[6] as u32,
        })
    }

    /// Read exactly one header from `reader`.
    pub fn read_from<R: Read>(reader: R) -> Result<Self, MalformedHeader> {
        let mut buf = Vec::with_capacity(HEADER_BYTES);
        reader
            .take(HEADER_BYTES as u64)
            .read_to_end(&mut buf)
            .map_err(|source| MalformedHeader::Unreadable { path: None, source })?;
        Self::from_bytes(&buf)
    }

    /// Read the header of a model file on disk.
    pub fn from_file(path: &Path) -> Result<Self, MalformedHeader> {
        let file = File::open(path).map_err(|source| MalformedHeader::Unreadable {
            path: Some(path.to_path_buf()),
            source,
        })?;
        let config = Self::read_from(file).map_err(|e| e.with_path(path))?;
        tracing::debug!(path = %path.display(), ?config, "decoded model header");
        Ok(config)
    }

    /// Encode back into the 28-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; HEADER_BYTES] {
        let fields = [
            self.dim as i32,
            self.hidden_dim as i32,
            self.n_layers as i32,
            self.n_heads as i32,
            self.n_kv_heads as i32,
            self.vocab.to_raw(),
            self.seq_len as i32,
        ];
        let mut out = [0u8; HEADER_BYTES];
        for (i, v) in fields.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn vocab_size(&self) -> u32 {
        self.vocab.magnitude
    }

    /// `dim / n_heads`.
    pub fn head_size(&self) -> u32 {
        self.dim / self.n_heads
    }

    /// `dim * n_kv_heads / n_heads`.
    pub fn kv_dim(&self) -> u64 {
        self.dim as u64 * self.n_kv_heads as u64 / self.n_heads as u64
    }
}

/// The header could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum MalformedHeader {
    #[error("malformed header: expected {HEADER_BYTES} bytes, got {got}")]
    Truncated { got: usize },

    #[error("malformed header: field `{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: i32 },

    #[error("malformed header: cannot read {}: {source}", display_path(.path))]
    Unreadable {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
}

impl MalformedHeader {
    fn with_path(self, p: &Path) -> Self {
        match self {
            MalformedHeader::Unreadable { path: None, source } => MalformedHeader::Unreadable {
                path: Some(p.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<reader>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(fields: [i32; 7]) -> Vec<u8> {
        fields.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_negative_vocab() {
        let config = ModelConfig::from_bytes(&encode([64, 128, 2, 4, 4, -512, 64])).unwrap();
        assert_eq!(config.dim, 64);
        assert_eq!(config.hidden_dim, 128);
        assert_eq!(config.n_layers, 2);
        assert_eq!(config.n_heads, 4);
        assert_eq!(config.n_kv_heads, 4);
        assert_eq!(config.vocab, VocabSize { magnitude: 512, flag: true });
        assert_eq!(config.seq_len, 64);
        assert_eq!(config.head_size(), 16);
        assert_eq!(config.kv_dim(), 64);
    }

    #[test]
    fn test_decode_positive_vocab_clears_flag() {
        let config = ModelConfig::from_bytes(&encode([288, 768, 6, 6, 6, 32000, 256])).unwrap();
        assert_eq!(config.vocab_size(), 32000);
        assert!(!config.vocab.flag);
    }

    #[test]
    fn test_trailing_weights_ignored() {
        let mut data = encode([8, 16, 1, 2, 1, 32, 8]);
        data.extend_from_slice(&[0xAB; 100]);
        let config = ModelConfig::from_bytes(&data).unwrap();
        assert_eq!(config.kv_dim(), 4);
    }

    #[test]
    fn test_truncated_header() {
        let data = encode([64, 128, 2, 4, 4, 512, 64]);
        let err = ModelConfig::from_bytes(&data[..27]).unwrap_err();
        assert!(matches!(err, MalformedHeader::Truncated { got: 27 }));
        assert!(matches!(ModelConfig::from_bytes(&[]), Err(MalformedHeader::Truncated { got: 0 })));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = ModelConfig::from_bytes(&encode([64, 128, 2, 0, 4, 512, 64])).unwrap_err();
        assert!(matches!(err, MalformedHeader::NonPositive { field: "n_heads", value: 0 }));

        let err = ModelConfig::from_bytes(&encode([64, 128, 2, 4, 4, 0, 64])).unwrap_err();
        assert!(matches!(err, MalformedHeader::NonPositive { field: "vocab_size", .. }));

        let err = ModelConfig::from_bytes(&encode([64, 128, -2, 4, 4, 512, 64])).unwrap_err();
        assert!(matches!(err, MalformedHeader::NonPositive { field: "n_layers", value: -2 }));
    }

    #[test]
    fn test_encode_decode_preserves_flag() {
        let config = ModelConfig::from_bytes(&encode([64, 128, 2, 4, 4, -512, 64])).unwrap();
        assert_eq!(&config.to_bytes()[..], &encode([64, 128, 2, 4, 4, -512, 64])[..]);
    }

    #[test]
    fn test_read_from_short_reader() {
        let data = encode([64, 128, 2, 4, 4, 512, 64]);
        let err = ModelConfig::read_from(&data[..10]).unwrap_err();
        assert!(matches!(err, MalformedHeader::Truncated { got: 10 }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, encode([64, 128, 2, 4, 4, -512, 64])).unwrap();
        let config = ModelConfig::from_file(&path).unwrap();
        assert_eq!(config.vocab_size(), 512);

        let missing = dir.path().join("missing.bin");
        match ModelConfig::from_file(&missing) {
            Err(MalformedHeader::Unreadable { path, .. }) => assert_eq!(path, Some(missing)),
            other => panic!("expected Unreadable, got {:?}", other),
        }
    }
}

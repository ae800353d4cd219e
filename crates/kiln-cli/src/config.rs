//! `kiln deploy` configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use kiln_core::{GenerationParams, TargetId};
use kiln_sim::SimConfig;
use kiln_upload::UploadConfig;

fn default_network() -> String {
    "local".to_string()
}

fn default_caller() -> String {
    "storyteller".to_string()
}

/// Everything one `deploy` run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Host network. Only `local` (the in-process host) is built in.
    #[serde(default = "default_network")]
    pub network: String,

    /// Content item the story is written into.
    pub target: TargetId,

    pub tokenizer_path: PathBuf,
    pub model_path: PathBuf,

    #[serde(default)]
    pub prompt: String,

    /// Principal the story is generated as.
    #[serde(default = "default_caller")]
    pub caller: String,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub generation: GenerationParams,

    /// Upper bound on continue calls after the start.
    #[serde(default)]
    pub max_continues: Option<u32>,

    #[serde(default)]
    pub sim: SimConfig,
}

impl DeployConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;

        // Relative blob paths are taken from the config's directory.
        if let Some(base) = path.parent() {
            config.tokenizer_path = base.join(&config.tokenizer_path);
            config.model_path = base.join(&config.model_path);
        }
        config.generation.validate()?;
        if config.upload.chunk_size().is_none() {
            anyhow::bail!("chunk_size_mib must be positive, got {}", config.upload.chunk_size_mib);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{"target": "nft-1", "tokenizer_path": "tok.bin", "model_path": "/abs/model.bin"}"#,
        )
        .unwrap();

        let config = DeployConfig::load(&path).unwrap();
        assert_eq!(config.network, "local");
        assert_eq!(config.target, TargetId::from("nft-1"));
        assert_eq!(config.tokenizer_path, dir.path().join("tok.bin"));
        assert_eq!(config.model_path, PathBuf::from("/abs/model.bin"));
        assert_eq!(config.generation.steps, 20);
        assert_eq!(config.upload, UploadConfig::default());
        assert!(config.max_continues.is_none());
    }

    #[test]
    fn test_invalid_generation_params_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{"target": "t", "tokenizer_path": "a", "model_path": "b",
                "generation": {"temperature": -1.0}}"#,
        )
        .unwrap();
        assert!(DeployConfig::load(&path).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = DeployConfig::load(Path::new("/nonexistent/deploy.json")).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}

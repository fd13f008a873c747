//! Runtime configuration for the CLI, loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup: the scripted model, three rounds, sessions stored under
//! `./sessions`. API keys are never written in the file; `[model]` names the
//! environment variable that holds one.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use agora_checkpoint::{CheckpointStore, FileCheckpointStore};

use crate::error::{CoachError, Result};
use crate::model::{scripted_default, ChatModel, HttpChatModel};

/// Looked for in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "agora.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub model: ModelConfig,
    pub run: RunConfig,
    pub storage: StorageConfig,
}

impl CoachConfig {
    /// Loads an explicit path (which must exist), or the default path if one
    /// is present, or the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(explicit) => Self::from_file(explicit),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_PATH);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|err| CoachError::config(format!("invalid config {}: {err}", path.display())))
    }
}

/// Which provider answers the agents, and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Scripted,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ModelConfig {
    pub fn build(&self) -> Result<Arc<dyn ChatModel>> {
        match self.provider {
            Provider::Scripted => Ok(Arc::new(scripted_default())),
            Provider::OpenAi => {
                let api_key = env::var(&self.api_key_env).map_err(|_| {
                    CoachError::config(format!(
                        "provider \"openai\" requires the {} environment variable",
                        self.api_key_env
                    ))
                })?;
                let model = HttpChatModel::new(
                    self.base_url.clone(),
                    self.model.clone(),
                    api_key,
                    Duration::from_secs(self.timeout_secs),
                )?;
                Ok(Arc::new(model))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Deterministic canned replies, no network.
    Scripted,
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_rounds: u64,
    pub cancellation_grace_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            cancellation_grace_ms: 2_000,
        }
    }
}

impl RunConfig {
    pub fn cancellation_grace(&self) -> Duration {
        Duration::from_millis(self.cancellation_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./sessions"),
        }
    }
}

impl StorageConfig {
    pub fn open_store(&self) -> Result<Arc<dyn CheckpointStore>> {
        Ok(Arc::new(FileCheckpointStore::new(self.dir.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_every_default() {
        let config: CoachConfig = toml::from_str("").unwrap();
        assert_eq!(config.model.provider, Provider::Scripted);
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.run.max_rounds, 3);
        assert_eq!(config.run.cancellation_grace(), Duration::from_secs(2));
        assert_eq!(config.storage.dir, PathBuf::from("./sessions"));
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let config: CoachConfig = toml::from_str(
            r#"
            [model]
            provider = "openai"
            model = "gpt-4o-mini"

            [run]
            max_rounds = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.model.provider, Provider::OpenAi);
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.run.max_rounds, 5);
        assert_eq!(config.run.cancellation_grace_ms, 2_000);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = CoachConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, CoachError::Io(_)));
    }

    #[test]
    fn openai_provider_without_a_key_is_a_config_error() {
        let config = ModelConfig {
            provider: Provider::OpenAi,
            api_key_env: "AGORA_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..ModelConfig::default()
        };
        let err = config.build().unwrap_err();
        assert!(matches!(err, CoachError::Config(_)));
    }
}

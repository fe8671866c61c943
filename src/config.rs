//! User configuration.
//!
//! Config is stored at `~/.config/pilot/config.toml` and contains:
//! - Gemini API key and endpoint
//! - chat and embedding model names
//! - indexing, retrieval and agent pacing knobs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

const CONFIG_DIR: &str = "pilot";
const CONFIG_FILE: &str = "config.toml";

/// Environment variable consulted when the config file has no key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// User configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Gemini API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the Gemini REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for chat, planning and code generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Pause between agent steps, in milliseconds.
    #[serde(default = "default_step_pause_ms")]
    pub step_pause_ms: u64,

    #[serde(default)]
    pub retry: RetrySettings,
}

/// Retry knobs for embedding calls during an index build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first attempt of every chunk.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Delay before each retry.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_chat_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

fn default_chunk_size() -> usize {
    2000
}

fn default_top_k() -> usize {
    4
}

fn default_step_pause_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1500
}

fn default_retry_delay_ms() -> u64 {
    5000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            chunk_size: default_chunk_size(),
            top_k: default_top_k(),
            step_pause_ms: default_step_pause_ms(),
            retry: RetrySettings::default(),
        }
    }
}

impl PilotConfig {
    /// Load config from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load config from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Reject values that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base_url '{}'", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("base_url must be http(s), got '{}'", url.scheme());
        }
        if self.chat_model.trim().is_empty() || self.embedding_model.trim().is_empty() {
            anyhow::bail!("Model names must not be empty");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// The API key, from the config file or else from `GEMINI_API_KEY`.
    pub fn api_key_secret(&self) -> Option<SecretString> {
        resolve_api_key(self.api_key.as_deref(), std::env::var(API_KEY_ENV).ok())
    }

    /// Check if an API key is available from any source.
    pub fn has_api_key(&self) -> bool {
        self.api_key_secret().is_some()
    }

    /// Set the API key.
    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key.trim().to_string());
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}

fn resolve_api_key(file_key: Option<&str>, env_key: Option<String>) -> Option<SecretString> {
    let file_key = file_key.map(str::trim).filter(|k| !k.is_empty());
    if let Some(key) = file_key {
        return Some(SecretString::from(key.to_string()));
    }
    env_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PilotConfig::default();
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url, "https://generativelanguage.googleapis.com");
        assert_eq!(config.embedding_model, "text-embedding-004");
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_key_wins_over_env() {
        let key = resolve_api_key(Some(" file-key "), Some("env-key".to_string())).unwrap();
        assert_eq!(key.expose_secret(), "file-key");
    }

    #[test]
    fn test_env_key_used_when_file_key_blank() {
        let key = resolve_api_key(Some("  "), Some("env-key".to_string())).unwrap();
        assert_eq!(key.expose_secret(), "env-key");
        assert!(resolve_api_key(None, Some(String::new())).is_none());
        assert!(resolve_api_key(None, None).is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: PilotConfig = toml::from_str(
            "api_key = \"k\"\nchunk_size = 500\n\n[retry]\nretry_delay_ms = 10\n",
        )
        .unwrap();
        assert_eq!(parsed.chunk_size, 500);
        assert_eq!(parsed.top_k, 4);
        assert_eq!(parsed.retry.retry_delay_ms, 10);
        assert_eq!(parsed.retry.max_attempts, 3);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PilotConfig::default();
        config.set_api_key("sk-test".to_string());
        config.step_pause_ms = 0;
        config.save_to(&path).unwrap();

        let loaded = PilotConfig::load_from(&path).unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("sk-test"));
        assert_eq!(loaded.step_pause_ms, 0);
        assert_eq!(loaded.retry, RetrySettings::default());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PilotConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chat_model, "gemini-2.5-pro");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PilotConfig::default();
        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = PilotConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}

//! Layered configuration: built-in defaults, an optional TOML file, then
//! `TRIAGE__*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/triage.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the gateway binds to
    pub bind: String,
    /// Base URL dashboard commands use to reach the gateway
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub transactions_path: PathBuf,
    pub fraud_scores_path: PathBuf,
    pub accounts_path: PathBuf,
    /// Directory holding per-user chat logs
    pub chats_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Transport timeout for one classification call
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Missing files are skipped so the defaults alone are a valid setup.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .context("Failed to serialize default configuration")?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("TRIAGE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.classifier.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
                api_url: "http://127.0.0.1:8000".to_string(),
            },
            data: DataConfig {
                transactions_path: PathBuf::from("data/transactions.csv"),
                fraud_scores_path: PathBuf::from("data/fraud_scores.csv"),
                accounts_path: PathBuf::from("data/accounts.json"),
                chats_dir: PathBuf::from("local_chats"),
            },
            classifier: ClassifierConfig {
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-2.5-flash".to_string(),
                api_key_env: "GOOGLE_API_KEY".to_string(),
                timeout_ms: 15_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.classifier.model, "gemini-2.5-flash");
        assert_eq!(config.classifier.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.data.chats_dir, PathBuf::from("local_chats"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.classifier.timeout_ms, 15_000);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("triage.toml");
        std::fs::write(
            &path,
            "[classifier]\nmodel = \"gemini-2.0-flash\"\ntimeout_ms = 2500\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.classifier.model, "gemini-2.0-flash");
        assert_eq!(config.classifier.timeout_ms, 2500);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }
}

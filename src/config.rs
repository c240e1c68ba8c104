//! Configuration management for the QuantumCoin server

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::path::Path;

use crate::ledger::crypto::CryptoError;
use crate::ledger::{Address, LedgerConfig};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "QUANTUM_COIN_CONFIG";

/// Used when the environment variable is unset
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid authority: {0}")]
    InvalidAuthority(#[from] CryptoError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerSection {
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default = "default_authority_name")]
    pub authority_name: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_restrict_mint")]
    pub restrict_mint_to_authority: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,
    #[serde(default = "default_data_dir")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            authority_name: default_authority_name(),
            difficulty: default_difficulty(),
            restrict_mint_to_authority: default_restrict_mint(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            path: default_data_dir(),
        }
    }
}

impl LedgerSection {
    /// Builds the ledger settings, validating the authority address
    pub fn to_ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        let authority: Address = self.authority.parse()?;

        Ok(LedgerConfig::new(authority, self.authority_name.clone(), self.difficulty)
            .with_restricted_minting(self.restrict_mint_to_authority))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_authority() -> String {
    "miner".to_string()
}

fn default_authority_name() -> String {
    "QuantumCoin".to_string()
}

fn default_difficulty() -> u32 {
    230
}

fn default_restrict_mint() -> bool {
    true
}

fn default_storage_enabled() -> bool {
    true
}

fn default_data_dir() -> String {
    "data/ledger".to_string()
}

/// Parses a configuration document and validates it
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents)?;
    validate(&config)?;
    Ok(config)
}

/// Loads configuration from `path`; a missing file yields the defaults
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_config(&contents)
}

/// Loads configuration from the file named by `QUANTUM_COIN_CONFIG`, or `config.toml`
pub fn load_config() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from_path(path)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.ledger.authority.trim().is_empty() {
        return Err(ConfigError::Invalid("ledger.authority must be set".to_string()));
    }

    if config.storage.enabled && config.storage.path.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "storage.path must be set when storage is enabled".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ledger.difficulty, 230);
        assert!(config.ledger.restrict_mint_to_authority);
    }

    #[test]
    fn test_partial_document() {
        let config = parse_config(
            r#"
            [ledger]
            authority = "0xabc"
            difficulty = 240
            restrict_mint_to_authority = false

            [storage]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.authority, "0xabc");
        assert_eq!(config.ledger.authority_name, "QuantumCoin");
        assert!(!config.storage.enabled);
        assert_eq!(config.server, ServerConfig::default());

        let ledger = config.ledger.to_ledger_config().unwrap();
        assert_eq!(ledger.authority, Address("0xabc".to_string()));
        assert_eq!(ledger.difficulty, 240);
        assert!(!ledger.restrict_mint_to_authority);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            parse_config("[ledger]\nauthority = \"  \""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("[storage]\npath = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("[server]\nport = \"eighty\""),
            Err(ConfigError::Parse(_))
        ));

        let section = LedgerSection {
            authority: "two words".to_string(),
            ..LedgerSection::default()
        };
        assert!(matches!(
            section.to_ledger_config(),
            Err(ConfigError::InvalidAuthority(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = 9090\n").unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 9090);
    }
}

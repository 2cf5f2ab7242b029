//! Store configuration
//!
//! Reads `tally.toml`. Lookup order: an explicit path, then `$TALLY_CONFIG`,
//! then the platform config directory. Missing files at the default location
//! fall back to built-in defaults; a missing file that was asked for by name
//! is an error.
//!
//! ```toml
//! [database]
//! path = "tally.db"
//! encrypt = true
//! key_env = "TALLY_DB_KEY"
//!
//! [seed]
//! demo_users = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{SeedOptions, DB_KEY_ENV};
use crate::error::{Error, Result};

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "TALLY_CONFIG";

/// Database file used when neither config nor flags name one
pub const DEFAULT_DB_PATH: &str = "tally.db";

/// Default config location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tally").join("tally.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Open with SQLCipher (passphrase read from `key_env`)
    pub encrypt: bool,
    pub key_env: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            encrypt: true,
            key_env: DB_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    pub seed: SeedOptions,

    /// File this config was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve and load the config (explicit path, `$TALLY_CONFIG`, default location)
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = override_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;
        config.source = Some(path.to_path_buf());
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse config from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        if config.database.key_env.trim().is_empty() {
            return Err(Error::Config("database.key_env must not be empty".into()));
        }
        Ok(config)
    }

    /// Database path as the pool expects it
    pub fn database_path(&self) -> Result<String> {
        self.database
            .path
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Database path is not valid UTF-8: {}",
                    self.database.path.display()
                ))
            })
    }

    /// Encryption passphrase, or `None` when encryption is off
    pub fn passphrase(&self) -> Result<Option<String>> {
        if !self.database.encrypt {
            return Ok(None);
        }
        match std::env::var(&self.database.key_env) {
            Ok(key) if !key.is_empty() => Ok(Some(key)),
            _ => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                self.database.key_env
            ))),
        }
    }
}

// Configuration - defaults, optional TOML file, environment overrides
//
// Resolution order (later wins):
// 1. Built-in defaults
// 2. TOML file (only the keys it sets)
// 3. MEMOGARDEN_* environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "MEMOGARDEN_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file. Parent directories are created on first connect.
    pub database_path: PathBuf,

    /// Mount point of the v1 HTTP API.
    pub api_v1_prefix: String,

    /// Origins allowed by the HTTP adapter's CORS layer.
    pub cors_origins: Vec<String>,

    /// ISO 4217 code used when a transaction does not name its currency.
    pub default_currency: String,

    /// Listen address of the HTTP adapter.
    pub bind_address: String,

    /// `tracing` filter directive (RUST_LOG takes precedence).
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: PathBuf::from("./data/memogarden.db"),
            api_v1_prefix: "/api/v1".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            default_currency: "SGD".to_string(),
            bind_address: "127.0.0.1:5000".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };

        let settings = settings.with_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Apply `MEMOGARDEN_*` overrides using `lookup` (the environment in
    /// production, a map in tests).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(path) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(prefix) = var("API_V1_PREFIX") {
            self.api_v1_prefix = prefix;
        }
        if let Some(origins) = var("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(currency) = var("DEFAULT_CURRENCY") {
            self.default_currency = currency.trim().to_uppercase();
        }
        if let Some(address) = var("BIND_ADDRESS") {
            self.bind_address = address;
        }
        if let Some(filter) = var("LOG_FILTER") {
            self.log_filter = filter;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        crate::entities::transaction::validate_currency(&self.default_currency)
            .map_err(|e| Error::Config(format!("default_currency: {}", e)))?;

        if !self.api_v1_prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "api_v1_prefix must start with '/': {}",
                self.api_v1_prefix
            )));
        }

        Ok(())
    }
}

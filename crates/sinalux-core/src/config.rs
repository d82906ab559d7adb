use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "sinalux.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable {var} has invalid value `{value}`")]
    InvalidEnv { var: &'static str, value: String },

    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Page size for the full-store backfill scan run by migrations.
    pub backfill_batch_size: u32,
    /// IANA zone used to turn timestamps into local calendar dates.
    pub timezone: String,
    pub initial_period_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sinalux.db".to_string(),
            max_connections: 1,
            backfill_batch_size: 200,
            timezone: "America/Sao_Paulo".to_string(),
            initial_period_days: 15,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Defaults, then the TOML file (explicit path, or `sinalux.toml` when it
    /// exists), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("SINALUX_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            self.database_url = url;
        }
        if let Some(value) = lookup("SINALUX_MAX_CONNECTIONS") {
            self.max_connections = parse_env("SINALUX_MAX_CONNECTIONS", value)?;
        }
        if let Some(value) = lookup("SINALUX_BACKFILL_BATCH_SIZE") {
            self.backfill_batch_size = parse_env("SINALUX_BACKFILL_BATCH_SIZE", value)?;
        }
        if let Some(value) = lookup("SINALUX_TIMEZONE") {
            self.timezone = value;
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }
}

fn parse_env(var: &'static str, value: String) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}

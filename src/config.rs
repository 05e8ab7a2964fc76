use crate::constants::{
    DEFAULT_BUSY_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_CLEANED_CSV, DEFAULT_CONFIG_PATH,
    DEFAULT_DATABASE_PATH, DEFAULT_LEDGER_PATH, DEFAULT_MAX_RECORDS, DEFAULT_RAW_CSV,
    DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
};
use crate::error::{MobilityError, Result};
use crate::pipeline::ZoneGrid;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub raw_csv: PathBuf,
    pub cleaned_csv: PathBuf,
    pub ledger_path: PathBuf,
    pub database_path: PathBuf,
    pub max_records: usize,
    pub chunk_size: usize,
    pub zone_grid: ZoneGrid,
    pub busy_timeout_secs: u64,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw_csv: PathBuf::from(DEFAULT_RAW_CSV),
            cleaned_csv: PathBuf::from(DEFAULT_CLEANED_CSV),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_records: DEFAULT_MAX_RECORDS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            zone_grid: ZoneGrid::default(),
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl Config {
    /// Load `.env`, then the TOML file, then environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `mobility.toml` is read if
    /// present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    MobilityError::Config(format!(
                        "Failed to read config file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_toml_str(&content)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_toml_str(&fs::read_to_string(DEFAULT_CONFIG_PATH)?)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MOBILITY_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("MOBILITY_DATABASE_PATH") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(raw) = lookup("MOBILITY_RAW_CSV") {
            self.raw_csv = PathBuf::from(raw);
        }
        if let Some(port) = lookup("MOBILITY_PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                MobilityError::Config(format!("MOBILITY_PORT must be a port number, got '{port}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(MobilityError::Config("max_records must be greater than 0".into()));
        }
        if self.chunk_size == 0 {
            return Err(MobilityError::Config("chunk_size must be greater than 0".into()));
        }
        if self.busy_timeout_secs == 0 {
            return Err(MobilityError::Config("busy_timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

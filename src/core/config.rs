//! Configuration management.
//!
//! Both binaries build a [`Config`] once at process start with
//! [`Config::from_env`] and pass it (or parts of it) into constructors.
//! Nothing reads configuration globally after that point.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use super::error::{Error, Result};
use super::transport::HttpConfig;
use crate::fleet::FleetConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tool server identification.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration for a tool server process.
    pub transport: HttpConfig,

    /// Fleet layout and supervisor/router policy for the orchestrator.
    pub fleet: FleetConfig,
}

/// Tool server identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Which built-in catalog this process serves (e.g. `benefits`).
    pub id: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Directory for daily log files; stderr only when `None`.
    pub directory: Option<PathBuf>,
}

/// Default directory for daily log files, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                id: "tool-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: Some(PathBuf::from(DEFAULT_LOG_DIR)),
            },
            transport: HttpConfig::default(),
            fleet: FleetConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `.env` and environment variables.
    ///
    /// - `TOOL_SERVER_ID`, `PORT`, `HOST`, `FLEET_RPC_PATH`: tool server
    /// - `FLEET_LOG_LEVEL`: log level for both binaries
    /// - `FLEET_LOG_DIR`: directory for daily log files; empty disables them
    /// - `FLEET_CONFIG`: path to a JSON fleet file; built-in fleet otherwise
    /// - `FLEET_*` policy overrides, see [`FleetConfig::apply_overrides`]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(id) = std::env::var("TOOL_SERVER_ID") {
            config.server.id = id;
        }

        if let Ok(level) = std::env::var("FLEET_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(dir) = std::env::var("FLEET_LOG_DIR") {
            config.logging.directory = (!dir.trim().is_empty()).then(|| PathBuf::from(dir));
        }

        config.transport = HttpConfig::from_env()?;

        if let Ok(path) = std::env::var("FLEET_CONFIG") {
            let path = PathBuf::from(path);
            config.fleet = FleetConfig::load(&path)?;
            info!("Fleet configuration loaded from {}", path.display());
        }
        config.fleet.apply_overrides(|name| std::env::var(name).ok())?;

        Ok(config)
    }
}

/// Parse an optional numeric setting, rejecting garbage.
pub(crate) fn parse_number<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{name} must be a number, got '{raw}'"))),
        None => Ok(None),
    }
}

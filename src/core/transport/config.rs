//! Transport configuration types.

use serde::{Deserialize, Serialize};

use crate::core::config::parse_number;
use crate::core::error::Result;

/// Default port when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3000;

/// HTTP transport configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Port number to listen on.
    pub port: u16,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Path for the operation-dispatch endpoint.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,
}

pub(crate) fn default_host() -> String {
    "127.0.0.1".to_string()
}

pub(crate) fn default_rpc_path() -> String {
    "/mcp".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: default_host(),
            rpc_path: default_rpc_path(),
        }
    }
}

impl HttpConfig {
    /// Create an HTTP transport config.
    pub fn new(port: u16, host: impl Into<String>) -> Self {
        Self {
            port,
            host: host.into(),
            ..Default::default()
        }
    }

    /// Load transport config from environment variables.
    ///
    /// `PORT` is part of the launch contract: the supervisor sets it for every
    /// server it spawns. A value that is not a port number is a config error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from `PORT`, `HOST` and `FLEET_RPC_PATH` as returned by
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = parse_number("PORT", lookup("PORT"))?.unwrap_or(DEFAULT_PORT);
        let host = lookup("HOST").unwrap_or_else(default_host);
        let rpc_path = lookup("FLEET_RPC_PATH").unwrap_or_else(default_rpc_path);
        Ok(Self {
            port,
            host,
            rpc_path,
        })
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.address(), "127.0.0.1:3000");
        assert_eq!(config.rpc_path, "/mcp");
    }

    #[test]
    fn test_serde_defaults() {
        let config: HttpConfig = serde_json::from_str(r#"{"port": 4100}"#).unwrap();
        assert_eq!(config, HttpConfig::new(4100, "127.0.0.1"));
        assert_eq!(config.rpc_path, "/mcp");
    }

    #[test]
    fn test_from_lookup() {
        let env = |name: &str| match name {
            "PORT" => Some("4100".to_string()),
            "FLEET_RPC_PATH" => Some("/rpc".to_string()),
            _ => None,
        };
        let config = HttpConfig::from_lookup(env).unwrap();
        assert_eq!(config.address(), "127.0.0.1:4100");
        assert_eq!(config.rpc_path, "/rpc");

        let config = HttpConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, HttpConfig::default());
    }

    #[test]
    fn test_bad_port_is_config_error() {
        for raw in ["http", "70000", "-1"] {
            let result = HttpConfig::from_lookup(|name| (name == "PORT").then(|| raw.to_string()));
            assert!(
                matches!(result, Err(crate::core::Error::Config(_))),
                "PORT={raw} accepted"
            );
        }
    }
}

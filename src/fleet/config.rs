//! Fleet configuration: which servers to run and how to supervise and call them.
//!
//! Loaded once at orchestrator start (built-in defaults, optionally replaced
//! by a JSON file, then environment overrides) and immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::parse_number;
use crate::core::error::{Error, Result};
use crate::domains::operations::definitions::{BENEFITS, CHASE_TRAVEL, SAFEPAY_WALLET};

/// Per-attempt timeout for a routed call.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Extra attempts after a timeout, idempotent operations only.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Health checks before a server counts as failed to start.
pub const DEFAULT_HEALTH_ATTEMPTS: u32 = 40;

/// Fixed delay between health checks.
pub const DEFAULT_HEALTH_BACKOFF_MS: u64 = 250;

/// Time between the termination signal and a forced kill.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// How long a stop waits for in-flight calls before signalling.
///
/// A routed call holds its lease across every attempt, so the default covers
/// the first attempt plus all retries.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = DEFAULT_CALL_TIMEOUT_MS * (1 + DEFAULT_MAX_RETRIES as u64);

/// Name of the tool server executable built by this crate.
pub const TOOL_SERVER_BIN: &str = "tool-server";

/// Static description of one tool server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Stable identifier; also passed to the process as `TOOL_SERVER_ID`.
    pub id: String,

    pub display_name: String,

    /// Executable to launch.
    pub command: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    /// Listen port, passed to the process as `PORT`.
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    /// Extra environment for the process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_working_directory() -> PathBuf {
    PathBuf::from(".")
}

impl ServerDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        command: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            command: command.into(),
            args: Vec::new(),
            port,
            host: default_host(),
            working_directory: default_working_directory(),
            env: BTreeMap::new(),
        }
    }

    /// `host:port` the server listens on.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Process supervision policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub health_attempts: u32,
    pub health_backoff_ms: u64,
    pub shutdown_grace_ms: u64,
    pub drain_timeout_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            health_attempts: DEFAULT_HEALTH_ATTEMPTS,
            health_backoff_ms: DEFAULT_HEALTH_BACKOFF_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl SupervisorSettings {
    pub fn health_backoff(&self) -> Duration {
        Duration::from_millis(self.health_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Call routing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub call_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RouterSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Longest a single routed call can hold its lease: one attempt plus
    /// every retry.
    pub fn call_budget(&self) -> Duration {
        self.call_timeout()
            .saturating_mul(self.max_retries.saturating_add(1))
    }
}

/// The whole fleet: descriptors plus policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    pub servers: Vec<ServerDescriptor>,

    #[serde(default)]
    pub supervisor: SupervisorSettings,

    #[serde(default)]
    pub router: RouterSettings,
}

impl Default for FleetConfig {
    /// The three built-in servers, launched from the `tool-server` binary that
    /// sits next to the current executable.
    fn default() -> Self {
        let command = sibling_executable(TOOL_SERVER_BIN);
        Self {
            servers: vec![
                ServerDescriptor::new(CHASE_TRAVEL, "Chase Travel", command.clone(), 3001),
                ServerDescriptor::new(SAFEPAY_WALLET, "SafePay Wallet", command.clone(), 3002),
                ServerDescriptor::new(BENEFITS, "Benefits", command, 3003),
            ],
            supervisor: SupervisorSettings::default(),
            router: RouterSettings::default(),
        }
    }
}

/// Path of `name` in the directory of the running executable, falling back
/// to a bare name resolved through `PATH`.
pub fn sibling_executable(name: &str) -> PathBuf {
    let file = format!("{name}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file)))
        .unwrap_or_else(|| PathBuf::from(file))
}

impl FleetConfig {
    /// Load a fleet from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read fleet config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::config(format!("invalid fleet config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty fleets and duplicate ids or addresses.
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::config("fleet has no servers"));
        }
        let mut ids = HashSet::new();
        let mut addresses = HashSet::new();
        for server in &self.servers {
            if server.id.trim().is_empty() {
                return Err(Error::config("server id must not be empty"));
            }
            if !ids.insert(server.id.as_str()) {
                return Err(Error::config(format!("duplicate server id '{}'", server.id)));
            }
            if !addresses.insert(server.address()) {
                return Err(Error::config(format!(
                    "server '{}' reuses address {}",
                    server.id,
                    server.address()
                )));
            }
        }
        if self.supervisor.health_attempts == 0 {
            return Err(Error::config("health_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Apply `FLEET_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_number("FLEET_CALL_TIMEOUT_MS", lookup("FLEET_CALL_TIMEOUT_MS"))? {
            self.router.call_timeout_ms = v;
        }
        if let Some(v) = parse_number("FLEET_CALL_RETRIES", lookup("FLEET_CALL_RETRIES"))? {
            self.router.max_retries = v;
        }
        if let Some(v) = parse_number("FLEET_HEALTH_ATTEMPTS", lookup("FLEET_HEALTH_ATTEMPTS"))? {
            self.supervisor.health_attempts = v;
        }
        if let Some(v) = parse_number("FLEET_HEALTH_BACKOFF_MS", lookup("FLEET_HEALTH_BACKOFF_MS"))? {
            self.supervisor.health_backoff_ms = v;
        }
        if let Some(v) = parse_number("FLEET_SHUTDOWN_GRACE_MS", lookup("FLEET_SHUTDOWN_GRACE_MS"))? {
            self.supervisor.shutdown_grace_ms = v;
        }
        if let Some(v) = parse_number("FLEET_DRAIN_TIMEOUT_MS", lookup("FLEET_DRAIN_TIMEOUT_MS"))? {
            self.supervisor.drain_timeout_ms = v;
        }
        self.validate()
    }

    /// Descriptor for `id`.
    pub fn server(&self, id: &str) -> Option<&ServerDescriptor> {
        self.servers.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_fleet() {
        let config = FleetConfig::default();
        let ids: Vec<_> = config.servers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["chase_travel", "safepay_wallet", "benefits"]);
        assert_eq!(config.server("benefits").unwrap().address(), "127.0.0.1:3003");
        assert!(config.validate().is_ok());
        assert_eq!(config.router.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.router.max_retries, 3);
    }

    #[test]
    fn test_load_from_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "servers": [
                    {{ "id": "benefits", "display_name": "Benefits", "command": "/bin/tool-server",
                       "port": 4003, "env": {{ "RUST_LOG": "debug" }} }}
                ],
                "router": {{ "call_timeout_ms": 500 }}
            }}"#
        )
        .unwrap();

        let config = FleetConfig::load(file.path()).unwrap();
        let server = &config.servers[0];
        assert_eq!(server.working_directory, PathBuf::from("."));
        assert_eq!(server.env["RUST_LOG"], "debug");
        assert_eq!(config.router.call_timeout_ms, 500);
        assert_eq!(config.router.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.supervisor, SupervisorSettings::default());
    }

    #[test]
    fn test_load_rejects_duplicates() {
        let mut config = FleetConfig::default();
        config.servers[1].id = "chase_travel".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = FleetConfig::default();
        config.servers[1].port = 3001;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_default_drain_covers_every_retry() {
        let config = FleetConfig::default();
        assert!(config.supervisor.drain_timeout() >= config.router.call_budget());
        assert_eq!(
            config.router.call_budget(),
            Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS * 4)
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = FleetConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read fleet config"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLEET_CALL_TIMEOUT_MS", "1200"),
            ("FLEET_CALL_RETRIES", "0"),
            ("FLEET_SHUTDOWN_GRACE_MS", "750"),
        ]
        .into_iter()
        .collect();

        let mut config = FleetConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.router.call_timeout_ms, 1200);
        assert_eq!(config.router.max_retries, 0);
        assert_eq!(config.supervisor.shutdown_grace(), Duration::from_millis(750));
        assert_eq!(config.supervisor.health_attempts, DEFAULT_HEALTH_ATTEMPTS);
    }

    #[test]
    fn test_override_rejects_zero_health_attempts() {
        let mut config = FleetConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "FLEET_HEALTH_ATTEMPTS").then(|| "0".to_string())
        });
        assert!(result.is_err());
    }
}

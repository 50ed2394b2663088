//! Tool server process supervision.
//!
//! The supervisor launches one child process per [`ServerDescriptor`], waits
//! for each to answer its health endpoint, and stops them again. Per server:
//!
//! ```text
//! NotStarted -> Starting -> Healthy <-> Unhealthy -> Stopped
//!                  |                                   ^
//!                  +-----------------------------------+
//! ```
//!
//! `start_all` is all-or-nothing: if any server fails to become healthy,
//! every process launched by the call is stopped before the error returns.
//! Stopping drains in-flight calls (see [`CallLease`]), sends SIGTERM, waits
//! out the grace period and then kills.

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::config::{FleetConfig, ServerDescriptor, SupervisorSettings};
use super::error::FleetError;
use super::health::HealthChecker;
use super::router::AddressResolver;

/// Lifecycle state of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    NotStarted,
    Starting,
    Healthy,
    Unhealthy,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Count of calls currently routed to one server.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A routed call's claim on a server.
///
/// While any lease is alive, stopping that server waits (up to the drain
/// timeout) before signalling the process.
#[derive(Debug)]
pub struct CallLease {
    server_id: String,
    address: String,
    in_flight: Option<Arc<InFlight>>,
}

impl CallLease {
    /// A lease on a server this process does not supervise.
    pub fn detached(server_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            address: address.into(),
            in_flight: None,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for CallLease {
    fn drop(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            in_flight.exit();
        }
    }
}

#[derive(Debug)]
struct Status {
    state: ServerState,
    draining: bool,
}

/// One launched process and its bookkeeping.
#[derive(Debug)]
struct ManagedServer {
    descriptor: ServerDescriptor,
    status: RwLock<Status>,
    child: AsyncMutex<Option<Child>>,
    pid: Option<u32>,
    in_flight: Arc<InFlight>,
}

impl ManagedServer {
    fn new(descriptor: ServerDescriptor, child: Option<Child>) -> Self {
        let pid = child.as_ref().and_then(Child::id);
        let state = if child.is_some() {
            ServerState::Starting
        } else {
            ServerState::Stopped
        };
        Self {
            descriptor,
            status: RwLock::new(Status {
                state,
                draining: false,
            }),
            child: AsyncMutex::new(child),
            pid,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    fn id(&self) -> &str {
        &self.descriptor.id
    }

    fn state(&self) -> ServerState {
        self.status.read().state
    }

    fn accepting(&self) -> bool {
        let status = self.status.read();
        status.state == ServerState::Healthy && !status.draining
    }

    /// Move to `to` only from one of `from`. Returns the previous state on success.
    fn transition(&self, from: &[ServerState], to: ServerState) -> Option<ServerState> {
        let mut status = self.status.write();
        if status.draining || !from.contains(&status.state) {
            return None;
        }
        let previous = status.state;
        status.state = to;
        Some(previous)
    }

    /// Exit status if the process has already exited.
    async fn exit_status(&self) -> Option<ExitStatus> {
        let mut child = self.child.lock().await;
        child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            id: self.descriptor.id.clone(),
            display_name: self.descriptor.display_name.clone(),
            address: self.descriptor.address(),
            state: self.state(),
            pid: self.pid,
            in_flight: self.in_flight.current(),
        }
    }
}

/// Point-in-time view of one server, for listings and tests.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    pub id: String,
    pub display_name: String,
    pub address: String,
    pub state: ServerState,
    pub pid: Option<u32>,
    pub in_flight: usize,
}

/// Owns the tool server processes of one fleet.
pub struct Supervisor {
    descriptors: Vec<ServerDescriptor>,
    settings: SupervisorSettings,
    health: HealthChecker,
    servers: RwLock<HashMap<String, Arc<ManagedServer>>>,
    launch_order: Mutex<Vec<String>>,
}

impl Supervisor {
    pub fn new(config: &FleetConfig) -> Self {
        Self::with_settings(config.servers.clone(), config.supervisor.clone())
    }

    pub fn with_settings(descriptors: Vec<ServerDescriptor>, settings: SupervisorSettings) -> Self {
        Self {
            descriptors,
            settings,
            health: HealthChecker::new(),
            servers: RwLock::new(HashMap::new()),
            launch_order: Mutex::new(Vec::new()),
        }
    }

    pub fn descriptors(&self) -> &[ServerDescriptor] {
        &self.descriptors
    }

    fn descriptor(&self, id: &str) -> Result<&ServerDescriptor, FleetError> {
        self.descriptors
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| FleetError::unknown_server(id))
    }

    fn handle(&self, id: &str) -> Option<Arc<ManagedServer>> {
        self.servers.read().get(id).cloned()
    }

    fn handles(&self) -> Vec<Arc<ManagedServer>> {
        self.servers.read().values().cloned().collect()
    }

    /// Launch every configured server in parallel.
    ///
    /// Returns once all are healthy. On any failure every launched process is
    /// stopped (reverse launch order) and the first failure in configuration
    /// order is returned.
    pub async fn start_all(&self) -> Result<(), FleetError> {
        info!("Starting {} tool server(s)", self.descriptors.len());

        let results = join_all(self.descriptors.iter().map(|d| self.launch(d))).await;

        if let Some(err) = results.into_iter().find_map(Result::err) {
            error!("Fleet startup failed: {}; rolling back", err);
            self.rollback().await;
            return Err(err);
        }

        info!("All {} tool server(s) healthy", self.descriptors.len());
        Ok(())
    }

    /// Launch a single server. Other servers are left untouched on failure.
    pub async fn start(&self, id: &str) -> Result<(), FleetError> {
        let descriptor = self.descriptor(id)?.clone();
        self.launch(&descriptor).await
    }

    async fn launch(&self, descriptor: &ServerDescriptor) -> Result<(), FleetError> {
        let id = descriptor.id.as_str();

        if let Some(existing) = self.handle(id) {
            match existing.state() {
                ServerState::Starting | ServerState::Healthy => {
                    debug!("Tool server '{}' already {}", id, existing.state());
                    return Ok(());
                }
                ServerState::Unhealthy => {
                    info!("Restarting unhealthy tool server '{}'", id);
                    self.shutdown_server(&existing).await;
                }
                ServerState::NotStarted | ServerState::Stopped => {}
            }
        }

        let address = descriptor.address();
        if self.health.responds(&address).await {
            self.record(descriptor, None);
            return Err(FleetError::startup_failed(
                id,
                format!("address {address} is already in use"),
            ));
        }

        let child = match spawn_process(descriptor) {
            Ok(child) => child,
            Err(e) => {
                self.record(descriptor, None);
                return Err(FleetError::startup_failed(
                    id,
                    format!("failed to spawn {}: {e}", descriptor.command.display()),
                ));
            }
        };

        let server = self.record(descriptor, Some(child));
        info!(
            "Launched tool server '{}' (pid {:?}) on {}",
            id, server.pid, address
        );

        match self.await_healthy(&server).await {
            Ok(()) => {
                if server
                    .transition(&[ServerState::Starting], ServerState::Healthy)
                    .is_some()
                {
                    info!("Tool server '{}' is healthy", id);
                    Ok(())
                } else {
                    Err(FleetError::startup_failed(id, "stopped while starting"))
                }
            }
            Err(reason) => {
                warn!("Tool server '{}' failed to start: {}", id, reason);
                self.shutdown_server(&server).await;
                Err(FleetError::startup_failed(id, reason))
            }
        }
    }

    fn record(&self, descriptor: &ServerDescriptor, child: Option<Child>) -> Arc<ManagedServer> {
        let server = Arc::new(ManagedServer::new(descriptor.clone(), child));
        self.servers
            .write()
            .insert(descriptor.id.clone(), server.clone());
        if server.pid.is_some() {
            let mut order = self.launch_order.lock();
            order.retain(|id| id != &descriptor.id);
            order.push(descriptor.id.clone());
        }
        server
    }

    async fn await_healthy(&self, server: &ManagedServer) -> Result<(), String> {
        let address = server.descriptor.address();
        let attempts = self.settings.health_attempts;
        let mut last_error = String::from("no health check attempted");

        for attempt in 1..=attempts {
            if let Some(status) = server.exit_status().await {
                return Err(format!("process exited ({status}) before becoming healthy"));
            }
            match self.health.check(&address, server.id()).await {
                Ok(_) => {
                    debug!("'{}' answered health check {}/{}", server.id(), attempt, attempts);
                    return Ok(());
                }
                Err(e) => {
                    debug!("'{}' health check {}/{}: {}", server.id(), attempt, attempts, e);
                    last_error = e;
                }
            }
            if attempt < attempts {
                sleep(self.settings.health_backoff()).await;
            }
        }

        Err(format!(
            "not healthy after {attempts} health check(s): {last_error}"
        ))
    }

    async fn rollback(&self) {
        let order: Vec<String> = self.launch_order.lock().clone();
        for id in order.iter().rev() {
            if let Some(server) = self.handle(id) {
                self.shutdown_server(&server).await;
            }
        }
    }

    /// Stop every server. Safe to call repeatedly.
    pub async fn stop_all(&self) {
        let servers = self.handles();
        if servers.is_empty() {
            return;
        }
        join_all(servers.iter().map(|s| self.shutdown_server(s))).await;
        info!("All tool servers stopped");
    }

    /// Stop one server. Stopping a server that is not running succeeds.
    pub async fn stop(&self, id: &str) -> Result<(), FleetError> {
        self.descriptor(id)?;
        if let Some(server) = self.handle(id) {
            self.shutdown_server(&server).await;
        }
        Ok(())
    }

    async fn shutdown_server(&self, server: &ManagedServer) {
        {
            let mut status = server.status.write();
            if status.state == ServerState::Stopped {
                return;
            }
            status.draining = true;
        }

        let pending = server.in_flight.current();
        if pending > 0 {
            info!("Draining {} in-flight call(s) on '{}'", pending, server.id());
            let drain = self.settings.drain_timeout();
            if timeout(drain, server.in_flight.wait_idle()).await.is_err() {
                warn!(
                    "'{}' still has {} call(s) in flight after {:?}; stopping anyway",
                    server.id(),
                    server.in_flight.current(),
                    drain
                );
            }
        }

        let child = server.child.lock().await.take();
        if let Some(child) = child {
            terminate(server.id(), child, self.settings.shutdown_grace()).await;
        }

        server.status.write().state = ServerState::Stopped;
    }

    /// Address of a healthy server.
    pub fn resolve(&self, id: &str) -> Result<String, FleetError> {
        self.descriptor(id)?;
        match self.handle(id) {
            Some(server) if server.accepting() => Ok(server.descriptor.address()),
            _ => Err(FleetError::unavailable(id)),
        }
    }

    /// Resolve a healthy server and register a call against it.
    pub fn lease(&self, id: &str) -> Result<CallLease, FleetError> {
        self.descriptor(id)?;
        let server = self.handle(id).ok_or_else(|| FleetError::unavailable(id))?;

        // Held across the increment so a concurrent stop sees this call.
        let status = server.status.read();
        if status.state != ServerState::Healthy || status.draining {
            return Err(FleetError::unavailable(id));
        }
        server.in_flight.enter();
        drop(status);

        Ok(CallLease {
            server_id: server.descriptor.id.clone(),
            address: server.descriptor.address(),
            in_flight: Some(server.in_flight.clone()),
        })
    }

    /// Check every running server and update `Healthy`/`Unhealthy`.
    pub async fn check_health(&self) -> Vec<ServerSnapshot> {
        let servers = self.handles();
        join_all(servers.iter().map(|s| self.refresh(s))).await;
        self.snapshot()
    }

    async fn refresh(&self, server: &ManagedServer) {
        if !matches!(
            server.state(),
            ServerState::Healthy | ServerState::Unhealthy
        ) {
            return;
        }

        let healthy = match server.exit_status().await {
            Some(status) => {
                warn!("Tool server '{}' exited unexpectedly ({})", server.id(), status);
                false
            }
            None => {
                let address = server.descriptor.address();
                match self.health.check(&address, server.id()).await {
                    Ok(_) => true,
                    Err(e) => {
                        debug!("'{}' health check failed: {}", server.id(), e);
                        false
                    }
                }
            }
        };

        let target = if healthy {
            ServerState::Healthy
        } else {
            ServerState::Unhealthy
        };
        let previous =
            server.transition(&[ServerState::Healthy, ServerState::Unhealthy], target);
        match previous {
            Some(ServerState::Healthy) if !healthy => {
                warn!("Tool server '{}' is unhealthy", server.id())
            }
            Some(ServerState::Unhealthy) if healthy => {
                info!("Tool server '{}' recovered", server.id())
            }
            _ => {}
        }
    }

    /// Current state of `id`, `None` if not configured.
    pub fn state(&self, id: &str) -> Option<ServerState> {
        self.descriptor(id).ok()?;
        Some(
            self.handle(id)
                .map_or(ServerState::NotStarted, |s| s.state()),
        )
    }

    /// All configured servers in configuration order.
    pub fn snapshot(&self) -> Vec<ServerSnapshot> {
        let servers = self.servers.read();
        self.descriptors
            .iter()
            .map(|d| match servers.get(&d.id) {
                Some(server) => server.snapshot(),
                None => ServerSnapshot {
                    id: d.id.clone(),
                    display_name: d.display_name.clone(),
                    address: d.address(),
                    state: ServerState::NotStarted,
                    pid: None,
                    in_flight: 0,
                },
            })
            .collect()
    }
}

impl AddressResolver for Supervisor {
    fn lease(&self, server_id: &str) -> Result<CallLease, FleetError> {
        Supervisor::lease(self, server_id)
    }

    fn available_servers(&self) -> Vec<String> {
        let servers = self.servers.read();
        self.descriptors
            .iter()
            .filter(|d| servers.get(&d.id).is_some_and(|s| s.accepting()))
            .map(|d| d.id.clone())
            .collect()
    }
}

fn spawn_process(descriptor: &ServerDescriptor) -> std::io::Result<Child> {
    let mut cmd = Command::new(&descriptor.command);
    cmd.args(&descriptor.args)
        .current_dir(&descriptor.working_directory)
        .env("PORT", descriptor.port.to_string())
        .env("HOST", &descriptor.host)
        .env("TOOL_SERVER_ID", &descriptor.id)
        .envs(&descriptor.env)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.spawn()
}

/// SIGTERM, wait up to `grace`, then kill.
async fn terminate(id: &str, mut child: Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            info!("Tool server '{}' had already exited ({})", id, status);
            return;
        }
        Ok(None) => {}
        Err(e) => warn!("Could not query '{}' before stopping: {}", id, e),
    }

    request_termination(id, &mut child);

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => info!("Tool server '{}' exited ({})", id, status),
        Ok(Err(e)) => warn!("Error waiting for '{}' to exit: {}", id, e),
        Err(_) => {
            warn!("Tool server '{}' ignored SIGTERM for {:?}; killing", id, grace);
            if let Err(e) = child.kill().await {
                error!("Failed to kill '{}': {}", id, e);
            }
        }
    }
}

#[cfg(unix)]
fn request_termination(id: &str, child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to '{}' (pid {}): {}", id, pid, e);
    }
}

#[cfg(not(unix))]
fn request_termination(id: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to stop '{}': {}", id, e);
    }
}

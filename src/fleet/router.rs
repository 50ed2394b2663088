//! Call routing across the fleet.
//!
//! The router maps an operation name to the server that advertises it,
//! leases that server from an [`AddressResolver`] (normally the
//! [`Supervisor`](super::Supervisor)), and sends one request envelope per
//! attempt.
//!
//! Timeouts apply per attempt. Only operations advertised as idempotent are
//! retried, and only after a timeout; connection failures and error envelopes
//! are returned as-is.
//!
//! One lease is held for the whole call, retries included, so a stop waits up
//! to [`RouterSettings::call_budget`] for it. A drain timeout configured below
//! that budget cuts the remaining attempts short when the server is stopped.
//!
//! Cancellation: dropping the future returned by [`CallRouter::call`] aborts
//! the HTTP request and releases the lease. The remote operation may or may
//! not have run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::config::RouterSettings;
use super::error::FleetError;
use super::supervisor::CallLease;
use crate::core::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::core::transport::default_rpc_path;
use crate::domains::operations::{OperationDescriptor, Parameters};

/// Source of server addresses for the router.
pub trait AddressResolver: Send + Sync {
    /// Claim a healthy server for the duration of one call.
    fn lease(&self, server_id: &str) -> Result<CallLease, FleetError>;

    /// Ids of servers that can currently be leased.
    fn available_servers(&self) -> Vec<String>;
}

/// Where an operation goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub server_id: String,
    pub idempotent: bool,
}

/// Body of a tool server's `GET /operations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub service: String,
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

/// Operation name to server. Fixed once built.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<String, Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from several catalogs. An operation advertised twice is an error.
    pub fn from_catalogs(catalogs: &[Catalog]) -> Result<Self, FleetError> {
        let mut table = Self::new();
        for catalog in catalogs {
            table.add_catalog(&catalog.service, &catalog.operations)?;
        }
        Ok(table)
    }

    pub fn add_catalog(
        &mut self,
        server_id: &str,
        operations: &[OperationDescriptor],
    ) -> Result<(), FleetError> {
        for op in operations {
            if let Some(existing) = self.routes.get(&op.name) {
                return Err(FleetError::DuplicateRoute {
                    operation: op.name.clone(),
                    first: existing.server_id.clone(),
                    second: server_id.to_string(),
                });
            }
            self.routes.insert(
                op.name.clone(),
                Route {
                    server_id: server_id.to_string(),
                    idempotent: op.idempotent,
                },
            );
        }
        Ok(())
    }

    pub fn route(&self, operation: &str) -> Result<&Route, FleetError> {
        self.routes
            .get(operation)
            .ok_or_else(|| FleetError::routing(operation))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// All routes, sorted by operation name.
    pub fn entries(&self) -> Vec<(&str, &Route)> {
        let mut entries: Vec<_> = self
            .routes
            .iter()
            .map(|(name, route)| (name.as_str(), route))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Routes operation calls to tool servers.
pub struct CallRouter {
    resolver: Arc<dyn AddressResolver>,
    table: RoutingTable,
    settings: RouterSettings,
    rpc_path: String,
    client: reqwest::Client,
}

impl CallRouter {
    pub fn new(
        resolver: Arc<dyn AddressResolver>,
        table: RoutingTable,
        settings: RouterSettings,
    ) -> Self {
        Self {
            resolver,
            table,
            settings,
            rpc_path: default_rpc_path(),
            client: reqwest::Client::new(),
        }
    }

    /// Path of the dispatch endpoint on every server.
    pub fn with_rpc_path(mut self, rpc_path: impl Into<String>) -> Self {
        self.rpc_path = rpc_path.into();
        self
    }

    /// Build the routing table from the catalogs of every available server.
    pub async fn discover(
        resolver: Arc<dyn AddressResolver>,
        settings: RouterSettings,
    ) -> Result<Self, FleetError> {
        let router = Self::new(resolver, RoutingTable::new(), settings);
        let mut catalogs = Vec::new();
        for id in router.resolver.available_servers() {
            let lease = router.resolver.lease(&id)?;
            let catalog = router.fetch_catalog(&lease).await?;
            if catalog.service != id {
                return Err(FleetError::transport(
                    &id,
                    format!("catalog is for '{}'", catalog.service),
                ));
            }
            debug!("'{}' advertises {} operation(s)", id, catalog.operations.len());
            catalogs.push(catalog);
        }
        let table = RoutingTable::from_catalogs(&catalogs)?;
        info!(
            "Routing table built: {} operation(s) across {} server(s)",
            table.len(),
            catalogs.len()
        );
        Ok(Self { table, ..router })
    }

    async fn fetch_catalog(&self, lease: &CallLease) -> Result<Catalog, FleetError> {
        let url = format!("http://{}/operations", lease.address());
        let request = async {
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| FleetError::transport(lease.server_id(), e.to_string()))?
                .json::<Catalog>()
                .await
                .map_err(|e| FleetError::transport(lease.server_id(), e.to_string()))
        };
        match timeout(self.settings.call_timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(FleetError::transport(
                lease.server_id(),
                "catalog request timed out",
            )),
        }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Invoke `operation` on whichever server advertises it.
    #[instrument(skip(self, parameters))]
    pub async fn call(&self, operation: &str, parameters: Parameters) -> Result<Value, FleetError> {
        let route = self.table.route(operation)?;
        let lease = self.resolver.lease(&route.server_id)?;
        let url = format!("http://{}{}", lease.address(), self.rpc_path);
        let envelope = RequestEnvelope::new(operation, parameters);

        let attempts = if route.idempotent {
            1 + self.settings.max_retries
        } else {
            1
        };
        let started = Instant::now();

        for attempt in 1..=attempts {
            match timeout(self.settings.call_timeout(), self.send(&lease, &url, &envelope)).await {
                Ok(response) => {
                    return response?.into_result().map_err(FleetError::remote);
                }
                Err(_) => {
                    warn!(
                        "'{}' on '{}' timed out (attempt {}/{})",
                        operation,
                        lease.server_id(),
                        attempt,
                        attempts
                    );
                }
            }
        }

        Err(FleetError::Timeout {
            operation: operation.to_string(),
            elapsed: started.elapsed(),
        })
    }

    async fn send(
        &self,
        lease: &CallLease,
        url: &str,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, FleetError> {
        let response = self
            .client
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| FleetError::transport(lease.server_id(), e.to_string()))?;

        // Error envelopes come back with 4xx as well; the body decides.
        let status = response.status();
        response.json::<ResponseEnvelope>().await.map_err(|e| {
            FleetError::transport(
                lease.server_id(),
                format!("unreadable response ({status}): {e}"),
            )
        })
    }
}

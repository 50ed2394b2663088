//! HTTP health probing of tool server processes.

use std::time::Duration;

use crate::core::server::HealthReport;

/// Default upper bound on a single health request.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Issues `GET /health` (and `POST /shutdown`) against a tool server.
///
/// Every request carries the health check timeout, so a server that accepts
/// connections but never answers cannot stall the caller.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::with_timeout(HEALTH_CHECK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check `address` and require a healthy report from `expected_id`.
    ///
    /// A report from a different service means something else owns the port.
    pub async fn check(&self, address: &str, expected_id: &str) -> Result<HealthReport, String> {
        let url = format!("http://{address}/health");
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("health request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("health endpoint returned {}", response.status()));
        }

        let report: HealthReport = response
            .json()
            .await
            .map_err(|e| format!("unreadable health report: {e}"))?;

        if !report.is_healthy() {
            return Err(format!("service reports status '{}'", report.status));
        }
        if report.service != expected_id {
            return Err(format!(
                "port answered as '{}', expected '{expected_id}'",
                report.service
            ));
        }
        Ok(report)
    }

    /// Whether anything answers on `address` at all.
    pub async fn responds(&self, address: &str) -> bool {
        self.client
            .get(format!("http://{address}/health"))
            .timeout(self.timeout)
            .send()
            .await
            .is_ok()
    }

    /// Ask the server on `address` to shut down via `POST /shutdown`.
    pub async fn request_shutdown(&self, address: &str) -> Result<(), String> {
        self.client
            .post(format!("http://{address}/shutdown"))
            .timeout(self.timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map(drop)
            .map_err(|e| format!("shutdown request failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_port() {
        // Bind then drop to find a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let address = format!("127.0.0.1:{port}");
        let health = HealthChecker::new();

        let err = health.check(&address, "benefits").await.unwrap_err();
        assert!(err.starts_with("health request failed"));
        assert!(!health.responds(&address).await);
        assert!(health.request_shutdown(&address).await.is_err());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts connections and never writes a response.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let health = HealthChecker::with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();

        assert!(health.check(&address, "benefits").await.is_err());
        assert!(!health.responds(&address).await);
        let err = health.request_shutdown(&address).await.unwrap_err();
        assert!(err.starts_with("shutdown request failed"), "{err}");

        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    }
}

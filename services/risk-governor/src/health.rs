//! Health and metrics surface
//!
//! Read-only projection of governor state for ops tooling:
//! - `GET /status`  → `{"killed": <bool>}`
//! - `GET /metrics` → Prometheus text exposition of the four metrics

use crate::error::GovernorError;
use crate::governor::RiskGovernor;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use warp::Filter;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Kill state as reported on `/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub killed: bool,
}

/// Exports governor state
#[derive(Clone)]
pub struct HealthExporter {
    governor: Arc<RiskGovernor>,
}

impl HealthExporter {
    pub fn new(governor: Arc<RiskGovernor>) -> Self {
        Self { governor }
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            killed: self.governor.is_killed(),
        }
    }

    /// Gauge per metric in the order pnl, slippage, gas_cost, latency
    pub fn metrics_text(&self) -> String {
        let (metrics, _) = self.governor.export();
        metrics
            .fields()
            .iter()
            .map(|(name, value)| format!("# TYPE {name} gauge\n{name} {value}\n"))
            .collect()
    }

    /// `/status` and `/metrics` routes
    pub fn routes(self) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let status_exporter = self.clone();
        let status = warp::path("status")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || warp::reply::json(&status_exporter.status()));

        let metrics_exporter = self;
        let metrics = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || {
                warp::reply::with_header(
                    metrics_exporter.metrics_text(),
                    "content-type",
                    PROMETHEUS_CONTENT_TYPE,
                )
            });

        status.or(metrics)
    }

    /// Bind `addr` now and return the bound address with the server future.
    ///
    /// The server runs once the future is polled and stops when `shutdown`
    /// resolves.
    pub fn bind<F>(
        self,
        addr: SocketAddr,
        shutdown: F,
    ) -> Result<(SocketAddr, impl Future<Output = ()> + 'static), GovernorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| GovernorError::Configuration(format!("cannot bind {addr}: {e}")))?;
        info!(addr = %bound, "Health server listening");
        Ok((bound, async move {
            server.await;
            info!("Health server stopped");
        }))
    }

    /// Serve the routes on `addr` until `shutdown` resolves
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<(), GovernorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (_, server) = self.bind(addr, shutdown)?;
        server.await;
        Ok(())
    }
}

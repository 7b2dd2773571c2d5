//! Risk Governor Service
//!
//! Shared safety core gating the MEV execution pipeline:
//! - Volatility-adjusted thresholds on PnL, slippage, gas cost and latency
//! - Monotonic kill switch visible to every producer and consumer
//! - Best-effort kill alerts over webhook, email and chat webhook
//! - Health and Prometheus-style metrics endpoints
//! - Trading loop driver that honours and pulls the kill switch

pub mod alerts;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod governor;
pub mod health;
pub mod metrics;
pub mod policy;
pub mod trading_loop;

pub use alerts::{AlertDispatcher, AlertEvent, AlertKind, AlertQueue, AlertWorker};
pub use config::GovernorConfig;
pub use error::GovernorError;
pub use governor::{KillTransition, RiskGovernor, TerminationHook};
pub use health::{HealthExporter, HealthStatus};
pub use metrics::MetricsSnapshot;
pub use policy::{AdjustedThresholds, ThresholdSet};

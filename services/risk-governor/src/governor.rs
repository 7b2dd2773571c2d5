//! Risk governor
//!
//! Owns the latest metrics, the threshold set and the kill flag behind a
//! single lock. Every update is evaluated against the volatility-adjusted
//! limits; a breach flips the monotonic kill switch. Alerts and the
//! termination hook run after the lock is released.

use crate::alerts::{AlertDispatcher, AlertEvent, AlertKind, AlertQueue, AlertWorker, alert_queue};
use crate::config::GovernorConfig;
use crate::error::GovernorError;
use crate::metrics::MetricsSnapshot;
use crate::policy::{self, AdjustedThresholds, ThresholdSet};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

const KILL_MESSAGE: &str = "Kill switch activated";

/// Callback invoked once when the kill switch flips
pub type TerminationHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Result of a kill attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillTransition {
    /// This call flipped the switch
    Activated,
    /// The switch was already set; nothing happened
    AlreadyKilled,
}

struct GovernorState {
    metrics: MetricsSnapshot,
    thresholds: ThresholdSet,
    killed: bool,
}

/// Shared safety governor gating the execution pipeline
pub struct RiskGovernor {
    state: Mutex<GovernorState>,
    /// Lock-free mirror of `state.killed`, only written under the lock
    killed: AtomicBool,
    alerts: AlertQueue,
    termination_hook: Option<TerminationHook>,
}

impl RiskGovernor {
    /// Create a governor publishing kill alerts on `alerts`
    pub fn new(thresholds: ThresholdSet, alerts: AlertQueue) -> Self {
        info!(
            pnl = thresholds.pnl(),
            slippage = thresholds.slippage(),
            gas_cost = thresholds.gas_cost(),
            latency = thresholds.latency(),
            volatility = thresholds.volatility(),
            "Risk governor created"
        );
        Self {
            state: Mutex::new(GovernorState {
                metrics: MetricsSnapshot::default(),
                thresholds,
                killed: false,
            }),
            killed: AtomicBool::new(false),
            alerts,
            termination_hook: None,
        }
    }

    /// Build the governor and its alert worker from configuration.
    ///
    /// The worker must be spawned on a tokio runtime for alerts to go out.
    pub fn from_config(config: &GovernorConfig) -> Result<(Self, AlertWorker), GovernorError> {
        let thresholds = config.thresholds.to_threshold_set()?;
        let (queue, worker) = alert_queue(AlertDispatcher::from_config(config)?);
        Ok((Self::new(thresholds, queue), worker))
    }

    /// Install a callback run once on the kill transition
    pub fn with_termination_hook(mut self, hook: TerminationHook) -> Self {
        self.termination_hook = Some(hook);
        self
    }

    /// Replace the current metrics and evaluate them
    pub fn update_metrics(
        &self,
        pnl: f64,
        slippage: f64,
        gas_cost: f64,
        latency: f64,
    ) -> Result<(), GovernorError> {
        self.record(MetricsSnapshot::new(pnl, slippage, gas_cost, latency)?)
    }

    /// Replace the current metrics with `metrics` and evaluate them.
    ///
    /// Once killed the snapshot is still stored but not evaluated.
    pub fn record(&self, metrics: MetricsSnapshot) -> Result<(), GovernorError> {
        metrics.validate()?;

        let breaches = {
            let mut state = self.state.lock();
            state.metrics = metrics;
            if state.killed {
                debug!(?metrics, "Metrics recorded after kill, evaluation skipped");
                return Ok(());
            }

            let breaches = policy::evaluate(&state.metrics, &state.thresholds.adjusted());
            if breaches.is_empty() {
                debug!(?metrics, "Metrics updated");
                return Ok(());
            }

            state.killed = true;
            self.killed.store(true, Ordering::Release);
            breaches
        };

        for breach in &breaches {
            warn!(
                metric = breach.metric,
                value = breach.value,
                limit = breach.limit,
                "Threshold breached"
            );
        }
        let summary = breaches
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.on_killed(AlertEvent::new(
            AlertKind::ThresholdBreach,
            format!("{KILL_MESSAGE}: threshold breached: {summary}"),
        ));
        Ok(())
    }

    /// Set the volatility multiplier.
    ///
    /// Takes effect on the next metrics update; the stored metrics are not
    /// re-evaluated.
    pub fn adjust_volatility(&self, volatility: f64) -> Result<(), GovernorError> {
        let volatility = GovernorError::check_non_negative("volatility", volatility)?;
        self.state.lock().thresholds.set_volatility(volatility);
        info!(volatility, "Volatility adjusted");
        Ok(())
    }

    /// Flip the kill switch. Only the first caller wins.
    pub fn kill_switch(&self) -> KillTransition {
        self.trigger(AlertEvent::new(AlertKind::KillSwitch, KILL_MESSAGE))
    }

    /// Operator kill carrying a reason in the alert
    pub fn manual_kill(&self, reason: &str) -> KillTransition {
        self.trigger(AlertEvent::new(
            AlertKind::Manual,
            format!("{KILL_MESSAGE} manually: {reason}"),
        ))
    }

    #[inline]
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Copy of the latest metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.lock().metrics
    }

    /// Metrics and kill flag read in one critical section
    pub fn export(&self) -> (MetricsSnapshot, bool) {
        let state = self.state.lock();
        (state.metrics, state.killed)
    }

    pub fn thresholds(&self) -> ThresholdSet {
        self.state.lock().thresholds
    }

    pub fn adjusted_thresholds(&self) -> AdjustedThresholds {
        self.state.lock().thresholds.adjusted()
    }

    /// Wait until every kill alert raised so far has been attempted.
    ///
    /// The [`AlertWorker`] from [`RiskGovernor::from_config`] must be spawned,
    /// otherwise this waits until that worker is dropped.
    pub async fn flush_alerts(&self) {
        self.alerts.flush().await;
    }

    fn trigger(&self, event: AlertEvent) -> KillTransition {
        if self.is_killed() {
            return KillTransition::AlreadyKilled;
        }

        {
            let mut state = self.state.lock();
            if state.killed {
                return KillTransition::AlreadyKilled;
            }
            state.killed = true;
            self.killed.store(true, Ordering::Release);
        }

        self.on_killed(event);
        KillTransition::Activated
    }

    /// Post-transition work, run by the winning caller outside the lock
    fn on_killed(&self, event: AlertEvent) {
        error!(kind = %event.kind, reason = %event.message, "KILL SWITCH ACTIVATED");
        self.alerts.enqueue(event);
        self.run_termination_hook();
    }

    fn run_termination_hook(&self) {
        let Some(hook) = &self.termination_hook else {
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| hook())) {
            Ok(Ok(())) => info!("Termination hook completed"),
            Ok(Err(e)) => error!(error = %e, "Termination hook failed"),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(reason = %reason, "Termination hook panicked");
            }
        }
    }
}

//! Trading loop driver
//!
//! Generic consumer of the governor. The loop:
//! - checks the kill switch before every dispatch and stops once it is set
//! - pulls the kill switch itself on an unhealthy venue, a nonce gap, or
//!   too many consecutive submission failures
//! - never clears the kill switch
//!
//! Sourcing and submitting trades is left to the [`TradeVenue`] implementation.

use crate::circuit_breaker::CircuitBreaker;
use crate::governor::RiskGovernor;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Where candidate trades come from and where they go
#[async_trait]
pub trait TradeVenue: Send + Sync {
    type Trade: Debug + Send + Sync;

    /// Wallet / connection health
    async fn healthy(&self) -> bool;

    /// Next batch of candidate trades, possibly empty
    async fn fetch(&self) -> anyhow::Result<Vec<Self::Trade>>;

    /// Next account nonce; must increase by exactly one per call
    async fn next_nonce(&self) -> anyhow::Result<u64>;

    /// Submit a trade, returning its transaction hash
    async fn submit(&self, trade: &Self::Trade, nonce: u64) -> anyhow::Result<String>;
}

#[async_trait]
impl<V: TradeVenue> TradeVenue for Arc<V> {
    type Trade = V::Trade;

    async fn healthy(&self) -> bool {
        (**self).healthy().await
    }

    async fn fetch(&self) -> anyhow::Result<Vec<Self::Trade>> {
        (**self).fetch().await
    }

    async fn next_nonce(&self) -> anyhow::Result<u64> {
        (**self).next_nonce().await
    }

    async fn submit(&self, trade: &Self::Trade, nonce: u64) -> anyhow::Result<String> {
        (**self).submit(trade, nonce).await
    }
}

/// Loop tuning
#[derive(Debug, Clone)]
pub struct TradingLoopConfig {
    /// Consecutive submission failures before the loop kills trading
    pub max_consecutive_failures: u32,
    /// Wait between fetches that returned nothing
    pub poll_interval: Duration,
    /// Minimum spacing of venue health checks
    pub health_interval: Duration,
}

impl Default for TradingLoopConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

/// Why the loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Killed,
    Shutdown,
}

pub struct TradingLoop<V: TradeVenue> {
    venue: V,
    governor: Arc<RiskGovernor>,
    breaker: CircuitBreaker,
    config: TradingLoopConfig,
    last_nonce: Option<u64>,
    last_health_check: Option<Instant>,
}

impl<V: TradeVenue> TradingLoop<V> {
    pub fn new(venue: V, governor: Arc<RiskGovernor>, config: TradingLoopConfig) -> Self {
        Self {
            venue,
            governor,
            breaker: CircuitBreaker::new(config.max_consecutive_failures),
            config,
            last_nonce: None,
            last_health_check: None,
        }
    }

    /// Run until the kill switch is set or `shutdown` fires.
    ///
    /// Every venue call races `shutdown`, so a hung venue cannot hold the loop.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> LoopExit {
        info!("Trading loop started");
        let exit = loop {
            if self.governor.is_killed() {
                break LoopExit::Killed;
            }

            match self.check_health(&mut shutdown).await {
                None => break LoopExit::Shutdown,
                Some(false) => break LoopExit::Killed,
                Some(true) => {}
            }

            let trades = match or_shutdown(&mut shutdown, self.venue.fetch()).await {
                None => break LoopExit::Shutdown,
                Some(Ok(trades)) => trades,
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to fetch trades");
                    Vec::new()
                }
            };
            let idle = trades.is_empty();

            let mut interrupted = false;
            for trade in trades {
                if self.governor.is_killed() {
                    break;
                }
                if self.process(trade, &mut shutdown).await.is_none() {
                    interrupted = true;
                    break;
                }
            }
            if interrupted {
                break LoopExit::Shutdown;
            }

            if self.governor.is_killed() {
                break LoopExit::Killed;
            }

            let wait = if idle {
                self.config.poll_interval
            } else {
                Duration::ZERO
            };
            if or_shutdown(&mut shutdown, tokio::time::sleep(wait)).await.is_none() {
                break LoopExit::Shutdown;
            }
        };
        info!(?exit, "Trading loop stopped");
        exit
    }

    /// `Some(false)` when the venue is unhealthy and the kill switch was pulled
    async fn check_health(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Option<bool> {
        let due = self
            .last_health_check
            .is_none_or(|at| at.elapsed() >= self.config.health_interval);
        if !due {
            return Some(true);
        }
        self.last_health_check = Some(Instant::now());

        if or_shutdown(shutdown, self.venue.healthy()).await? {
            return Some(true);
        }
        error!("Venue unhealthy, killing trading");
        self.governor.kill_switch();
        Some(false)
    }

    /// `None` when shutdown interrupted a venue call
    async fn process(&mut self, trade: V::Trade, shutdown: &mut broadcast::Receiver<()>) -> Option<()> {
        let nonce = match or_shutdown(shutdown, self.venue.next_nonce()).await? {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!(error = %e, "Failed to obtain nonce");
                self.record_failure();
                return Some(());
            }
        };

        if let Some(last) = self.last_nonce {
            let expected = last.saturating_add(1);
            if nonce != expected {
                error!(nonce, expected, "Nonce mismatch, killing trading");
                self.governor.kill_switch();
                return Some(());
            }
        }
        self.last_nonce = Some(nonce);

        match or_shutdown(shutdown, self.venue.submit(&trade, nonce)).await? {
            Ok(tx_hash) => {
                self.breaker.record_success();
                info!(tx = %tx_hash, nonce, "Trade dispatched");
            }
            Err(e) => {
                warn!(error = %e, nonce, ?trade, "Trade submission failed");
                self.record_failure();
            }
        }
        Some(())
    }

    fn record_failure(&self) {
        if self.breaker.record_failure() {
            error!(
                failures = self.breaker.failures(),
                "Consecutive failure limit reached, killing trading"
            );
            self.governor.kill_switch();
        }
    }
}

/// Await `fut` unless `shutdown` fires first
async fn or_shutdown<T>(shutdown: &mut broadcast::Receiver<()>, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = shutdown.recv() => None,
        value = fut => Some(value),
    }
}

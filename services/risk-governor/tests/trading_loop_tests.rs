//! Integration tests for the trading loop driver

use async_trait::async_trait;
use risk_governor::alerts::alert_queue;
use risk_governor::trading_loop::{LoopExit, TradeVenue, TradingLoop, TradingLoopConfig};
use risk_governor::{AlertDispatcher, AlertWorker, RiskGovernor, ThresholdSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Default)]
struct MockVenue {
    batches: Mutex<VecDeque<Vec<u32>>>,
    /// Scripted submit outcomes; missing entries succeed
    outcomes: Mutex<VecDeque<bool>>,
    nonce: AtomicU64,
    skip_nonce_after: Option<u64>,
    unhealthy: AtomicBool,
    /// Submissions never complete
    hang_submits: AtomicBool,
    fetches: AtomicUsize,
    submits: AtomicUsize,
}

impl MockVenue {
    fn with_batches(batches: Vec<Vec<u32>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            ..Self::default()
        }
    }

    fn with_outcomes(self, outcomes: Vec<bool>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes.into();
        self
    }
}

#[async_trait]
impl TradeVenue for MockVenue {
    type Trade = u32;

    async fn healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }

    async fn fetch(&self) -> anyhow::Result<Vec<u32>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn next_nonce(&self) -> anyhow::Result<u64> {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        match self.skip_nonce_after {
            Some(limit) if nonce > limit => Ok(nonce + 1),
            _ => Ok(nonce),
        }
    }

    async fn submit(&self, trade: &u32, nonce: u64) -> anyhow::Result<String> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.hang_submits.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            Ok(format!("0x{trade:04x}{nonce:04x}"))
        } else {
            Err(anyhow::anyhow!("execution reverted"))
        }
    }
}

fn governor() -> (Arc<RiskGovernor>, AlertWorker) {
    let thresholds = ThresholdSet::new(10.0, 1.0, 5.0, 1.0).unwrap();
    let (queue, worker) = alert_queue(AlertDispatcher::new(Duration::from_secs(1)));
    (Arc::new(RiskGovernor::new(thresholds, queue)), worker)
}

fn fast_config() -> TradingLoopConfig {
    TradingLoopConfig {
        poll_interval: Duration::from_millis(5),
        ..TradingLoopConfig::default()
    }
}

async fn run_to_exit(venue: Arc<MockVenue>, governor: Arc<RiskGovernor>) -> LoopExit {
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let trading = TradingLoop::new(venue, governor, fast_config());
    tokio::time::timeout(Duration::from_secs(2), trading.run(shutdown_rx))
        .await
        .expect("trading loop should exit")
}

#[tokio::test]
async fn test_already_killed_never_fetches() {
    let (governor, _worker) = governor();
    governor.kill_switch();
    let venue = Arc::new(MockVenue::with_batches(vec![vec![1, 2, 3]]));

    let exit = run_to_exit(Arc::clone(&venue), governor).await;

    assert_eq!(exit, LoopExit::Killed);
    assert_eq!(venue.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(venue.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_consecutive_failures_kill() {
    let (governor, _worker) = governor();
    let venue = Arc::new(
        MockVenue::with_batches(vec![vec![1, 2, 3, 4, 5]]).with_outcomes(vec![false; 5]),
    );

    let exit = run_to_exit(Arc::clone(&venue), Arc::clone(&governor)).await;

    assert_eq!(exit, LoopExit::Killed);
    assert!(governor.is_killed());
    // The fourth trade sees the kill switch and is never submitted
    assert_eq!(venue.submits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_success_resets_failure_streak() {
    let (governor, _worker) = governor();
    let venue = Arc::new(
        MockVenue::with_batches(vec![vec![1, 2, 3, 4, 5]])
            .with_outcomes(vec![false, false, true, false, false]),
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let trading = TradingLoop::new(Arc::clone(&venue), Arc::clone(&governor), fast_config());
    let handle = tokio::spawn(trading.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    let exit = handle.await.unwrap();

    assert_eq!(exit, LoopExit::Shutdown);
    assert!(!governor.is_killed());
    assert_eq!(venue.submits.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_nonce_gap_kills() {
    let (governor, _worker) = governor();
    let venue = Arc::new(MockVenue {
        skip_nonce_after: Some(2),
        ..MockVenue::with_batches(vec![vec![1, 2, 3, 4]])
    });

    let exit = run_to_exit(Arc::clone(&venue), Arc::clone(&governor)).await;

    assert_eq!(exit, LoopExit::Killed);
    assert!(governor.is_killed());
    assert_eq!(venue.submits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unhealthy_venue_kills() {
    let (governor, _worker) = governor();
    let venue = Arc::new(MockVenue::with_batches(vec![vec![1]]));
    venue.unhealthy.store(true, Ordering::SeqCst);

    let exit = run_to_exit(Arc::clone(&venue), Arc::clone(&governor)).await;

    assert_eq!(exit, LoopExit::Killed);
    assert!(governor.is_killed());
    assert_eq!(venue.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_external_kill_stops_idle_loop() {
    let (governor, _worker) = governor();
    let venue = Arc::new(MockVenue::default());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let trading = TradingLoop::new(Arc::clone(&venue), Arc::clone(&governor), fast_config());
    let handle = tokio::spawn(trading.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!handle.is_finished());

    // A breach reported by another producer halts the loop
    governor.update_metrics(0.0, 0.0, 0.0, 2.0).unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop should notice the kill")
        .unwrap();

    assert_eq!(exit, LoopExit::Killed);
    assert!(venue.fetches.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_shutdown_stops_loop_without_kill() {
    let (governor, _worker) = governor();
    let venue = Arc::new(MockVenue::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let trading = TradingLoop::new(venue, Arc::clone(&governor), fast_config());
    let handle = tokio::spawn(trading.run(shutdown_rx));

    shutdown_tx.send(()).unwrap();
    let exit = handle.await.unwrap();

    assert_eq!(exit, LoopExit::Shutdown);
    assert!(!governor.is_killed());
}

#[tokio::test]
async fn test_shutdown_interrupts_hung_submission() {
    let (governor, _worker) = governor();
    let venue = Arc::new(MockVenue::with_batches(vec![vec![1, 2]]));
    venue.hang_submits.store(true, Ordering::SeqCst);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let trading = TradingLoop::new(Arc::clone(&venue), Arc::clone(&governor), fast_config());
    let handle = tokio::spawn(trading.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(venue.submits.load(Ordering::SeqCst), 1);
    assert!(!handle.is_finished());

    shutdown_tx.send(()).unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("shutdown should interrupt the venue call")
        .unwrap();

    assert_eq!(exit, LoopExit::Shutdown);
    assert!(!governor.is_killed());
    assert_eq!(venue.submits.load(Ordering::SeqCst), 1);
}

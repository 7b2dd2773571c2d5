//! Consecutive-failure circuit breaker
//!
//! Trips once `threshold` failures arrive without an intervening success.
//! There is no cooldown: a trip is escalated to the kill switch, which is
//! terminal for the process.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct CircuitBreaker {
    is_open: AtomicBool,
    failure_count: AtomicU32,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            is_open: AtomicBool::new(false),
            failure_count: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }

    pub fn record_success(&self) {
        if !self.is_open() {
            self.failure_count.store(0, Ordering::Release);
        }
    }

    /// Record a failure; true when this failure tripped the breaker
    pub fn record_failure(&self) -> bool {
        let count = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.threshold {
            return !self.is_open.swap(true, Ordering::AcqRel);
        }
        false
    }
}

//! Metrics snapshot reported by producers

use crate::error::GovernorError;
use serde::{Deserialize, Serialize};

/// Latest reading of every monitored quantity.
///
/// Replaced wholesale on each update, never merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Profit and loss (may be negative)
    pub pnl: f64,
    /// Realized slippage
    pub slippage: f64,
    /// Gas spent
    pub gas_cost: f64,
    /// Execution latency
    pub latency: f64,
}

impl MetricsSnapshot {
    /// Build a snapshot, rejecting non-finite values
    pub fn new(pnl: f64, slippage: f64, gas_cost: f64, latency: f64) -> Result<Self, GovernorError> {
        let snapshot = Self {
            pnl,
            slippage,
            gas_cost,
            latency,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check every field is finite
    pub fn validate(&self) -> Result<(), GovernorError> {
        for (name, value) in self.fields() {
            GovernorError::check_finite(name, value)?;
        }
        Ok(())
    }

    /// Fields in export order: pnl, slippage, gas_cost, latency
    pub fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("pnl", self.pnl),
            ("slippage", self.slippage),
            ("gas_cost", self.gas_cost),
            ("latency", self.latency),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_negative_pnl() {
        let snapshot = MetricsSnapshot::new(-12.5, 0.1, 3.0, 0.2).unwrap();
        assert_eq!(snapshot.pnl, -12.5);
    }

    #[test]
    fn test_new_rejects_non_finite() {
        let err = MetricsSnapshot::new(0.0, 0.0, f64::INFINITY, 0.0).unwrap_err();
        assert!(matches!(
            err,
            GovernorError::Validation {
                field: "gas_cost",
                ..
            }
        ));

        assert!(MetricsSnapshot::new(0.0, f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_fields_order() {
        let snapshot = MetricsSnapshot::new(1.0, 2.0, 3.0, 4.0).unwrap();
        let names: Vec<_> = snapshot.fields().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["pnl", "slippage", "gas_cost", "latency"]);
    }
}

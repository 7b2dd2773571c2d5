//! Threshold policy
//!
//! Base limits scaled uniformly by a volatility multiplier:
//! `adjusted = base * (1 + volatility)`. A metric breaches when its
//! magnitude meets or exceeds the adjusted limit.

use crate::error::GovernorError;
use crate::metrics::MetricsSnapshot;
use serde::Serialize;
use std::fmt;

/// Configured limits plus the current volatility multiplier
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdSet {
    pnl: f64,
    slippage: f64,
    gas_cost: f64,
    latency: f64,
    volatility: f64,
}

impl ThresholdSet {
    /// Create a threshold set with zero volatility
    pub fn new(pnl: f64, slippage: f64, gas_cost: f64, latency: f64) -> Result<Self, GovernorError> {
        Ok(Self {
            pnl: GovernorError::check_non_negative("pnl", pnl)?,
            slippage: GovernorError::check_non_negative("slippage", slippage)?,
            gas_cost: GovernorError::check_non_negative("gas_cost", gas_cost)?,
            latency: GovernorError::check_non_negative("latency", latency)?,
            volatility: 0.0,
        })
    }

    /// Same limits with an initial volatility
    pub fn with_volatility(mut self, volatility: f64) -> Result<Self, GovernorError> {
        self.volatility = GovernorError::check_non_negative("volatility", volatility)?;
        Ok(self)
    }

    pub fn pnl(&self) -> f64 {
        self.pnl
    }

    pub fn slippage(&self) -> f64 {
        self.slippage
    }

    pub fn gas_cost(&self) -> f64 {
        self.gas_cost
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    /// Only the governor moves volatility, and only on request
    pub(crate) fn set_volatility(&mut self, volatility: f64) {
        self.volatility = volatility;
    }

    /// Limits scaled by the current volatility
    pub fn adjusted(&self) -> AdjustedThresholds {
        let factor = 1.0 + self.volatility;
        AdjustedThresholds {
            pnl: self.pnl * factor,
            slippage: self.slippage * factor,
            gas_cost: self.gas_cost * factor,
            latency: self.latency * factor,
        }
    }
}

/// Effective limits after volatility scaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdjustedThresholds {
    pub pnl: f64,
    pub slippage: f64,
    pub gas_cost: f64,
    pub latency: f64,
}

impl AdjustedThresholds {
    fn fields(&self) -> [f64; 4] {
        [self.pnl, self.slippage, self.gas_cost, self.latency]
    }
}

/// A single metric at or over its limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breach {
    pub metric: &'static str,
    pub value: f64,
    pub limit: f64,
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (limit {})", self.metric, self.value, self.limit)
    }
}

/// Every field whose magnitude is `>=` its adjusted limit, in field order
pub fn evaluate(metrics: &MetricsSnapshot, limits: &AdjustedThresholds) -> Vec<Breach> {
    metrics
        .fields()
        .into_iter()
        .zip(limits.fields())
        .filter(|((_, value), limit)| value.abs() >= *limit)
        .map(|((metric, value), limit)| Breach {
            metric,
            value,
            limit,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ThresholdSet {
        ThresholdSet::new(10.0, 1.0, 5.0, 1.0).unwrap()
    }

    #[test]
    fn test_adjusted_without_volatility_is_base() {
        let adjusted = base().adjusted();
        assert_eq!(adjusted.pnl, 10.0);
        assert_eq!(adjusted.slippage, 1.0);
        assert_eq!(adjusted.gas_cost, 5.0);
        assert_eq!(adjusted.latency, 1.0);
    }

    #[test]
    fn test_adjusted_scales_every_field() {
        let adjusted = base().with_volatility(1.0).unwrap().adjusted();
        assert_eq!(adjusted.pnl, 20.0);
        assert_eq!(adjusted.slippage, 2.0);
        assert_eq!(adjusted.gas_cost, 10.0);
        assert_eq!(adjusted.latency, 2.0);
    }

    #[test]
    fn test_adjusted_leaves_base_untouched() {
        let thresholds = base().with_volatility(0.5).unwrap();
        let _ = thresholds.adjusted();
        assert_eq!(thresholds.pnl(), 10.0);
        assert_eq!(thresholds.volatility(), 0.5);
    }

    #[test]
    fn test_rejects_negative_limits() {
        assert!(ThresholdSet::new(-1.0, 1.0, 1.0, 1.0).is_err());
        assert!(base().with_volatility(-0.5).is_err());
        assert!(ThresholdSet::new(1.0, f64::NAN, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_evaluate_below_limits() {
        let metrics = MetricsSnapshot::new(9.99, 0.5, 4.0, 0.0).unwrap();
        assert!(evaluate(&metrics, &base().adjusted()).is_empty());
    }

    #[test]
    fn test_evaluate_boundary_is_breach() {
        let metrics = MetricsSnapshot::new(0.0, 1.0, 0.0, 0.0).unwrap();
        let breaches = evaluate(&metrics, &base().adjusted());
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric, "slippage");
        assert_eq!(breaches[0].limit, 1.0);
    }

    #[test]
    fn test_evaluate_uses_magnitude() {
        let metrics = MetricsSnapshot::new(-25.0, 0.0, 0.0, 0.0).unwrap();
        let breaches = evaluate(&metrics, &base().adjusted());
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].value, -25.0);
    }

    #[test]
    fn test_evaluate_reports_all_breaches_in_order() {
        let metrics = MetricsSnapshot::new(0.0, 3.0, 0.0, 7.0).unwrap();
        let breaches = evaluate(&metrics, &base().adjusted());
        let names: Vec<_> = breaches.iter().map(|b| b.metric).collect();
        assert_eq!(names, vec!["slippage", "latency"]);
        assert_eq!(breaches[1].to_string(), "latency 7 (limit 1)");
    }
}

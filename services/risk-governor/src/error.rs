//! Error types for the risk governor

use thiserror::Error;

/// Errors surfaced by the governor's public API
#[derive(Debug, Error)]
pub enum GovernorError {
    /// Input rejected before any state was touched
    #[error("Invalid value for {field}: {value}")]
    Validation {
        /// Name of the offending field
        field: &'static str,
        /// The rejected value
        value: f64,
    },

    /// Construction-time failure (transport or config could not be built)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GovernorError {
    /// Reject `value` unless it is finite
    pub(crate) fn check_finite(field: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Self::Validation { field, value })
        }
    }

    /// Reject `value` unless it is finite and not negative
    pub(crate) fn check_non_negative(field: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(Self::Validation { field, value })
        }
    }
}

/// Failure of a single alert channel.
///
/// Never leaves the dispatcher: every variant is logged and dropped there.
#[derive(Debug, Error)]
pub enum ChannelDeliveryError {
    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Endpoint returned status {0}")]
    Status(u16),

    /// SMTP transport failure
    #[error("SMTP delivery failed: {0}")]
    Email(#[from] lettre::transport::smtp::Error),

    /// Message could not be assembled (bad address, missing field)
    #[error("Invalid email message: {0}")]
    Message(String),

    /// Channel did not finish within its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Channel task panicked or was cancelled
    #[error("Channel task aborted: {0}")]
    Aborted(String),
}

impl From<lettre::address::AddressError> for ChannelDeliveryError {
    fn from(e: lettre::address::AddressError) -> Self {
        Self::Message(e.to_string())
    }
}

impl From<lettre::error::Error> for ChannelDeliveryError {
    fn from(e: lettre::error::Error) -> Self {
        Self::Message(e.to_string())
    }
}

//! Risk governor configuration

use crate::error::GovernorError;
use crate::policy::ThresholdSet;
use serde::{Deserialize, Serialize};

const DEFAULT_ALERT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9090";
const DEFAULT_EMAIL_SUBJECT: &str = "Risk Alert";
const DEFAULT_SMTPS_PORT: u16 = 465;
const ENV_PREFIX: &str = "RISK_GOVERNOR";

/// Risk governor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Base limits and starting volatility
    pub thresholds: ThresholdConfig,

    /// Generic webhook receiving `{"event": "kill_switch"}`
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// SMTP alert settings
    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// Chat webhook receiving `{"text": <message>}`
    #[serde(default)]
    pub chat_webhook_url: Option<String>,

    /// Per-channel delivery deadline
    #[serde(default = "default_alert_timeout_ms")]
    pub alert_timeout_ms: u64,

    /// Health surface
    #[serde(default)]
    pub http: HttpConfig,
}

/// Base threshold limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub pnl: f64,
    pub slippage: f64,
    pub gas_cost: f64,
    pub latency: f64,
    #[serde(default)]
    pub volatility: f64,
}

/// SMTP settings for email alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Subject line
    #[serde(default = "default_email_subject")]
    pub subject: String,
    /// Sender mailbox
    pub from: String,
    /// Recipient mailbox
    pub to: String,
    /// SMTP relay host (implicit TLS)
    pub host: String,
    /// SMTP relay port
    #[serde(default = "default_smtps_port")]
    pub port: u16,
    /// Login user; login is skipped unless both user and password are set
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// HTTP health surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

fn default_alert_timeout_ms() -> u64 {
    DEFAULT_ALERT_TIMEOUT_MS
}

fn default_email_subject() -> String {
    DEFAULT_EMAIL_SUBJECT.to_string()
}

fn default_smtps_port() -> u16 {
    DEFAULT_SMTPS_PORT
}

impl ThresholdConfig {
    /// Validated threshold set
    pub fn to_threshold_set(&self) -> Result<ThresholdSet, GovernorError> {
        ThresholdSet::new(self.pnl, self.slippage, self.gas_cost, self.latency)?
            .with_volatility(self.volatility)
    }
}

impl GovernorConfig {
    /// Configuration with the given limits and no alert channels
    pub fn with_thresholds(thresholds: ThresholdConfig) -> Self {
        Self {
            thresholds,
            webhook_url: None,
            email: None,
            chat_webhook_url: None,
            alert_timeout_ms: DEFAULT_ALERT_TIMEOUT_MS,
            http: HttpConfig::default(),
        }
    }

    /// Load configuration from an optional file plus `RISK_GOVERNOR__*` env overrides
    pub fn load(path: Option<&str>) -> Result<Self, GovernorError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| GovernorError::Configuration(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| GovernorError::Configuration(e.to_string()))?;

        // Surface bad limits at startup rather than on first update
        config.thresholds.to_threshold_set()?;
        Ok(config)
    }
}

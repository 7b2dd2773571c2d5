//! Alert dispatch
//!
//! Independent, best-effort notification channels announcing kill
//! transitions:
//! - Generic webhook (`{"event": "kill_switch"}`)
//! - SMTP email
//! - Chat webhook (`{"text": <message>}`)
//!
//! Every channel is attempted once. Failures are logged at the dispatcher
//! boundary and never reach the governor.
//!
//! Kill alerts go through [`AlertDispatcher::dispatch`] over the configured
//! [`AlertChannel`]s. `send_webhook`, `send_email` and `send_chat_webhook`
//! are one-shot sends to an explicit destination for callers outside the
//! kill path; both routes share the transports and the delivery timeout.

pub mod email;
pub mod webhook;
pub mod worker;

use crate::config::{EmailConfig, GovernorConfig};
use crate::error::{ChannelDeliveryError, GovernorError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use email::EmailChannel;
pub use webhook::{ChatWebhookChannel, WebhookChannel};
pub use worker::{AlertQueue, AlertWorker, alert_queue};

/// What caused the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Kill switch pulled by a caller (trading loop, health check)
    KillSwitch,
    /// Operator-triggered kill with a reason
    Manual,
    /// Kill caused by a threshold breach
    ThresholdBreach,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KillSwitch => "kill_switch",
            Self::Manual => "manual",
            Self::ThresholdBreach => "threshold_breach",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification, built once and handed to every channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One notification transport
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Deliver the event once
    async fn deliver(&self, event: &AlertEvent) -> Result<(), ChannelDeliveryError>;
}

/// Outcome of fanning one event out to every channel
#[derive(Debug, Default, Clone)]
pub struct DispatchReport {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Fan-out over the configured channels
pub struct AlertDispatcher {
    http: reqwest::Client,
    channels: Vec<Arc<dyn AlertChannel>>,
    timeout: Duration,
}

impl AlertDispatcher {
    /// Dispatcher with no channels
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            channels: Vec::new(),
            timeout,
        }
    }

    /// Build every configured channel; absent ones are simply left out
    pub fn from_config(config: &GovernorConfig) -> Result<Self, GovernorError> {
        let mut dispatcher = Self::new(Duration::from_millis(config.alert_timeout_ms));

        if let Some(url) = &config.webhook_url {
            let channel = WebhookChannel::new(dispatcher.http.clone(), url.clone());
            dispatcher = dispatcher.with_channel(Arc::new(channel));
        }
        if let Some(email) = &config.email {
            dispatcher = dispatcher.with_channel(Arc::new(EmailChannel::new(email)?));
        }
        if let Some(url) = &config.chat_webhook_url {
            let channel = ChatWebhookChannel::new(dispatcher.http.clone(), url.clone());
            dispatcher = dispatcher.with_channel(Arc::new(channel));
        }

        info!(
            channels = ?dispatcher.channel_names(),
            timeout_ms = config.alert_timeout_ms,
            "Alert dispatcher configured"
        );
        Ok(dispatcher)
    }

    /// Add a channel
    pub fn with_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send `event` on every channel concurrently.
    ///
    /// Each channel runs in its own task under the dispatcher timeout, so a
    /// hung or panicking transport only fails itself.
    pub async fn dispatch(&self, event: &AlertEvent) -> DispatchReport {
        let handles: Vec<_> = self
            .channels
            .iter()
            .map(|channel| {
                let channel = Arc::clone(channel);
                let event = event.clone();
                let timeout = self.timeout;
                let name = channel.name();
                let handle =
                    tokio::spawn(async move { within(timeout, channel.deliver(&event)).await });
                (name, handle)
            })
            .collect();

        let mut report = DispatchReport::default();
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ChannelDeliveryError::Aborted(e.to_string())),
            };
            match outcome {
                Ok(()) => {
                    info!(channel = name, kind = %event.kind, "Alert delivered");
                    report.delivered.push(name);
                }
                Err(e) => {
                    warn!(channel = name, kind = %event.kind, error = %e, "Alert delivery failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }

    /// POST a JSON payload to `url`; true when delivered
    pub async fn send_webhook(&self, url: &str, payload: &serde_json::Value) -> bool {
        self.attempt("webhook", webhook::post_json(&self.http, url, payload))
            .await
    }

    /// Send a plain-text email with `config`; true when delivered
    pub async fn send_email(&self, config: &EmailConfig, subject: &str, body: &str) -> bool {
        self.attempt("email", email::send(config, subject, body)).await
    }

    /// POST `{"text": text}` to a chat webhook; true when delivered
    pub async fn send_chat_webhook(&self, url: &str, text: &str) -> bool {
        self.attempt("chat_webhook", webhook::post_chat(&self.http, url, text))
            .await
    }

    async fn attempt<F>(&self, name: &'static str, delivery: F) -> bool
    where
        F: std::future::Future<Output = Result<(), ChannelDeliveryError>>,
    {
        match within(self.timeout, delivery).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = name, error = %e, "Alert delivery failed");
                false
            }
        }
    }
}

/// Run one delivery under `timeout`
async fn within<F>(timeout: Duration, delivery: F) -> Result<(), ChannelDeliveryError>
where
    F: std::future::Future<Output = Result<(), ChannelDeliveryError>>,
{
    tokio::time::timeout(timeout, delivery)
        .await
        .unwrap_or_else(|_| {
            Err(ChannelDeliveryError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ))
        })
}

//! Webhook transports

use super::{AlertChannel, AlertEvent};
use crate::error::ChannelDeliveryError;
use async_trait::async_trait;
use serde_json::json;

/// POST a JSON body and require a 2xx answer
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<(), ChannelDeliveryError> {
    let response = client.post(url).json(payload).send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ChannelDeliveryError::Status(status.as_u16()))
    }
}

/// POST `{"text": text}` to a Slack-compatible chat webhook
pub(crate) async fn post_chat(
    client: &reqwest::Client,
    url: &str,
    text: &str,
) -> Result<(), ChannelDeliveryError> {
    post_json(client, url, &json!({ "text": text })).await
}

/// Generic webhook announcing kill transitions as `{"event": "kill_switch"}`
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, _event: &AlertEvent) -> Result<(), ChannelDeliveryError> {
        // Every governor alert is a kill transition; the cause travels on
        // the chat and email channels.
        post_json(&self.client, &self.url, &json!({ "event": "kill_switch" })).await
    }
}

/// Chat webhook (Slack-compatible) posting `{"text": <message>}`
pub struct ChatWebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl ChatWebhookChannel {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl AlertChannel for ChatWebhookChannel {
    fn name(&self) -> &'static str {
        "chat_webhook"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), ChannelDeliveryError> {
        post_chat(&self.client, &self.url, &event.message).await
    }
}

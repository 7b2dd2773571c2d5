//! SMTP email transport

use super::{AlertChannel, AlertEvent};
use crate::config::EmailConfig;
use crate::error::{ChannelDeliveryError, GovernorError};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Implicit-TLS relay for `config`, logging in only when both user and password are set
fn transport(config: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelDeliveryError> {
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);
    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
    }
    Ok(builder.build())
}

fn message(from: Mailbox, to: Mailbox, subject: &str, body: &str) -> Result<Message, ChannelDeliveryError> {
    Ok(Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())?)
}

/// One-shot send with a transport built for this call
pub(crate) async fn send(config: &EmailConfig, subject: &str, body: &str) -> Result<(), ChannelDeliveryError> {
    let email = message(config.from.parse()?, config.to.parse()?, subject, body)?;
    transport(config)?.send(email).await?;
    Ok(())
}

/// Email alerts with addresses and transport resolved at construction
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    subject: String,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self, GovernorError> {
        let invalid = |e: ChannelDeliveryError| GovernorError::Configuration(format!("email alerts: {e}"));

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| invalid(e.into()))?;
        let to = config.to.parse::<Mailbox>().map_err(|e| invalid(e.into()))?;

        Ok(Self {
            transport: transport(config).map_err(invalid)?,
            from,
            to,
            subject: config.subject.clone(),
        })
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), ChannelDeliveryError> {
        let email = message(
            self.from.clone(),
            self.to.clone(),
            &self.subject,
            &event.message,
        )?;
        self.transport.send(email).await?;
        Ok(())
    }
}

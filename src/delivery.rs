//! Outbound mail delivery

use crate::config::SmtpConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

/// Transmits a message to external addresses.
///
/// Delivery is attempted before a sent mail is stored, so an error here
/// means no record gets created.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, from: &str, to: &[String], subject: &str, body: &str) -> Result<()>;
}

/// SMTP relay delivery over implicit TLS.
///
/// Mail leaves through the configured SMTP account; the local sender
/// address is carried as the display name of `From`.
pub struct SmtpDelivery {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    account: Address,
    subject_prefix: String,
}

impl SmtpDelivery {
    /// Build a relay transport from configuration. No connection is
    /// made until the first delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host or account address is
    /// invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let account: Address = config
            .username
            .parse()
            .map_err(|e| Error::Config(format!("Invalid SMTP_USER '{}': {e}", config.username)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| Error::Config(format!("Invalid SMTP_HOST '{}': {e}", config.host)))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            account,
            subject_prefix: config.subject_prefix.clone(),
        })
    }

    fn build_message(&self, from: &str, to: &[String], subject: &str, body: &str) -> Result<Message> {
        let mut builder = Message::builder()
            .from(Mailbox::new(Some(from.to_string()), self.account.clone()))
            .subject(format!("{}{subject}", self.subject_prefix));

        for recipient in to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| Error::InvalidInput(format!("Invalid recipient '{recipient}': {e}")))?;
            builder = builder.to(mailbox);
        }

        builder
            .body(body.to_string())
            .map_err(|e| Error::DeliveryFailed(format!("Failed to build message: {e}")))
    }
}

#[async_trait]
impl Delivery for SmtpDelivery {
    async fn deliver(&self, from: &str, to: &[String], subject: &str, body: &str) -> Result<()> {
        let message = self.build_message(from, to, subject, body)?;

        self.transport.send(message).await.map_err(|e| {
            warn!("Failed to send email: {}", e);
            Error::DeliveryFailed(e.to_string())
        })?;

        info!("Delivered mail from {} to {} recipient(s)", from, to.len());
        Ok(())
    }
}

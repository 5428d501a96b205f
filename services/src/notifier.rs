//! Out-of-band notification collaborator.
//!
//! The core only needs `send(address, subject, body)`. Delivery failures come
//! back as `AppError::Delivery`; callers log them and carry on.

use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::{Arc, Mutex};
use util::config::AppConfig;

use crate::error::AppError;

const SMTP_RELAY: &str = "smtp.gmail.com";
const SMTP_PORT: u16 = 587;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

/// Picks SMTP when credentials are configured, otherwise a logging stand-in.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn Notifier>, AppError> {
    if config.smtp_configured() {
        Ok(Arc::new(SmtpNotifier::from_config(config)?))
    } else {
        tracing::warn!("SMTP credentials not configured; notifications will only be logged");
        Ok(Arc::new(LogNotifier))
    }
}

/// Gmail relay over STARTTLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let tls_parameters = TlsParameters::new(SMTP_RELAY.to_string())
            .map_err(|e| AppError::Delivery(format!("TLS setup failed: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(SMTP_RELAY)
            .map_err(|e| AppError::Delivery(format!("SMTP transport setup failed: {e}")))?
            .port(SMTP_PORT)
            .tls(Tls::Required(tls_parameters))
            .credentials(Credentials::new(
                config.gmail_username.clone(),
                config.gmail_app_password.clone(),
            ))
            .build();

        let from = format!("{} <{}>", config.email_from_name, config.gmail_username)
            .parse::<Mailbox>()
            .map_err(|e| AppError::Delivery(format!("invalid sender address: {e}")))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| AppError::Delivery(format!("invalid recipient address: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_owned())
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| AppError::Delivery(e.to_string()))
    }
}

/// Records the subject line only; bodies may carry one-time codes.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), AppError> {
        tracing::info!(recipient = to, subject, "notification not sent (no SMTP transport)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every message in memory. Used by tests and the development seeder.
#[derive(Clone, Default)]
pub struct OutboxNotifier {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<OutboundMessage> {
        self.messages().into_iter().rev().find(|m| m.to == to)
    }

    /// The six-digit code in the latest message sent to `to`.
    pub fn last_code_to(&self, to: &str) -> Option<String> {
        let body = self.last_to(to)?.body;
        body.split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_owned)
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| AppError::Delivery("outbox poisoned".into()))?;
        sent.push(OutboundMessage {
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

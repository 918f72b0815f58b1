//! SMTP transport and failure classification.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::{Email, EmailBody, MailError, SendError, Transport};
use crate::config::EnvConfig;

/// Reply codes providers use to defer a whole session or sender.
const DEFERRAL_CODES: [u16; 2] = [421, 452];

/// Enhanced status codes for policy and sending-limit refusals (RFC 3463).
/// `4.7.` is matched as a prefix.
const QUOTA_STATUSES: [&str; 2] = ["4.7.", "5.4.5"];

/// Reply text fragments that mark quota exhaustion.
const RATE_LIMIT_HINTS: [&str; 4] = ["quota", "rate limit", "ratelimit", "too many"];

/// Configuration for SMTP mailer.
#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Sender mailbox for every message.
    pub from: String,

    /// TLS mode: "starttls" (default), "tls", or "none".
    #[serde(default = "default_tls")]
    pub tls: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_port() -> u16 {
    587
}

fn default_tls() -> String {
    "starttls".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// SMTP-based transport using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer from `SMTP_*` environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        dotenvy::dotenv().ok();

        let config = MailerConfig::from_env_with_prefix("SMTP")
            .map_err(|e| MailError::MissingConfig(e.to_string()))?;

        Self::from_config(config)
    }

    pub fn from_config(config: MailerConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let mut builder = match config.tls.as_str() {
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout)));

        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: Arc::new(builder.build()),
            from,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject);

        let message = match &email.body {
            EmailBody::Text(text) => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text.clone()),
            EmailBody::Html(html) => builder
                .header(ContentType::TEXT_HTML)
                .body(html.clone()),
        };

        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), SendError> {
        let message = self.build_message(email)?;

        match self.transport.send(message).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let code = e.status().and_then(|c| c.to_string().parse::<u16>().ok());
                Err(classify(code, &e.to_string()))
            }
        }
    }
}

/// Map an SMTP failure to a [`SendError`].
///
/// A failure is a rate limit only when the reply text names a quota and the
/// reply code or enhanced status is one used for sender deferral. Anything
/// else, including greylisting (450) and local errors (451), concerns the one
/// recipient and is a plain failure.
pub(crate) fn classify(code: Option<u16>, message: &str) -> SendError {
    let text = message.to_ascii_lowercase();
    let by_text = RATE_LIMIT_HINTS.iter().any(|hint| text.contains(hint));
    let by_code = code.is_some_and(|c| DEFERRAL_CODES.contains(&c));
    let by_status = text
        .split(|c: char| c.is_whitespace() || matches!(c, ':' | '(' | ')' | ','))
        .any(|word| QUOTA_STATUSES.iter().any(|status| word.starts_with(status)));

    if by_text && (by_code || by_status) {
        SendError::RateLimited(message.to_string())
    } else {
        SendError::Failed(MailError::Smtp(message.to_string()))
    }
}

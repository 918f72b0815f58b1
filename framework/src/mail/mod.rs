//! Outbound mail transport.
//!
//! This module provides a thin abstraction over [lettre](https://lettre.rs)
//! that reports each delivery attempt as a typed outcome. Provider quota
//! exhaustion is surfaced as [`SendError::RateLimited`] by the transport
//! itself, so callers never inspect error text.
//!
//! # Environment Variables
//!
//! [`SmtpMailer::from_env`] reads:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SMTP_HOST` | Yes | SMTP server hostname |
//! | `SMTP_PORT` | No | Port (default: 587) |
//! | `SMTP_USERNAME` | No | Username for authentication |
//! | `SMTP_PASSWORD` | No | Password for authentication |
//! | `SMTP_FROM` | Yes | Sender mailbox, e.g. `News <news@example.com>` |
//! | `SMTP_TLS` | No | `starttls` (default), `tls`, or `none` |
//! | `SMTP_TIMEOUT` | No | Connection timeout in seconds (default: 10) |

mod dry_run;
mod mailer;
mod message;

pub use dry_run::LogTransport;
pub use mailer::{MailerConfig, SmtpMailer};
pub use message::{Email, EmailBody};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Outcome of a failed delivery attempt.
#[derive(Debug, Error)]
pub enum SendError {
    /// The provider refused because a sending quota or rate was exceeded.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error(transparent)]
    Failed(#[from] MailError),
}

impl SendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Async mail delivery.
///
/// Implement this trait to provide alternative backends.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, email: &Email) -> Result<(), SendError>;
}

#[async_trait]
impl<T: Transport> Transport for std::sync::Arc<T> {
    async fn send(&self, email: &Email) -> Result<(), SendError> {
        (**self).send(email).await
    }
}

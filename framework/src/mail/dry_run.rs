use async_trait::async_trait;

use super::{Email, SendError, Transport};

/// Transport that logs each message instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, email: &Email) -> Result<(), SendError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            html = email.body.is_html(),
            bytes = email.body.as_str().len(),
            "dry run: message not sent"
        );
        Ok(())
    }
}

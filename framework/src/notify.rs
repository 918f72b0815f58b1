//! Administrative notices about campaign progress.

use std::sync::Arc;

use crate::mail::{Email, Transport};

/// Sends fixed-content notices to an operator over the campaign transport.
///
/// Delivery is best-effort: failures are logged and reported as `false`,
/// never returned as errors.
pub struct Notifier<T> {
    transport: Arc<T>,
    admin: Option<String>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            admin: self.admin.clone(),
        }
    }
}

impl<T: Transport> Notifier<T> {
    /// `admin` of `None` disables notices.
    pub fn new(transport: Arc<T>, admin: Option<String>) -> Self {
        Self { transport, admin }
    }

    pub async fn notify(&self, address: &str, subject: &str, body: &str, is_html: bool) -> bool {
        let email = Email::new(address, subject, body, is_html);
        match self.transport.send(&email).await {
            Ok(()) => {
                tracing::info!(to = %address, %subject, "notification sent");
                true
            }
            Err(e) => {
                tracing::warn!(to = %address, %subject, error = %e, "notification failed");
                false
            }
        }
    }

    /// Every recipient of the campaign has been sent.
    pub async fn campaign_complete(&self, total: usize) -> bool {
        let Some(admin) = self.admin.as_deref() else {
            tracing::debug!("no notify address configured, skipping completion notice");
            return false;
        };
        let body = format!("All {total} recipients of the campaign have been sent.");
        self.notify(admin, "Mailing complete", &body, false).await
    }

    /// Sending resumed after a backoff window.
    pub async fn resumed(&self, remaining: usize) -> bool {
        let Some(admin) = self.admin.as_deref() else {
            tracing::debug!("no notify address configured, skipping resume notice");
            return false;
        };
        let body = format!("Sending has resumed. {remaining} recipients remain.");
        self.notify(admin, "Mailing resumed", &body, false).await
    }
}

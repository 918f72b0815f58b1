//! Serialized access to the pending store.
//!
//! Ingestion and the dispatch loop share one [`RecipientQueue`]. Every
//! operation holds the queue lock across its whole load-modify-save cycle, so
//! an ingested batch and a sent flag written at the same moment are both kept.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::store::{PendingRecipient, PendingState, PendingStore, StoreError};

/// Point-in-time counts for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_run_at: Option<OffsetDateTime>,
    pub notification_sent: bool,
}

impl From<&PendingState> for QueueSummary {
    fn from(state: &PendingState) -> Self {
        Self {
            total: state.recipients.len(),
            pending: state.pending_count(),
            sent: state.sent_count(),
            next_run_at: state.next_run_at,
            notification_sent: state.notification_sent,
        }
    }
}

pub struct RecipientQueue<S> {
    store: Arc<S>,
    lock: Arc<Mutex<()>>,
}

impl<S> Clone for RecipientQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            lock: self.lock.clone(),
        }
    }
}

impl<S: PendingStore> RecipientQueue<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load, apply `f`, and save if anything changed, all under the lock.
    ///
    /// A failed load is returned as an error before `f` runs, so a snapshot
    /// that could not be read is never overwritten.
    pub async fn update<R>(&self, f: impl FnOnce(&mut PendingState) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let mut state = self.store.try_load().await?;
        let before = state.clone();
        let result = f(&mut state);
        if state != before {
            self.store.save(&state).await?;
        }
        Ok(result)
    }

    /// A fresh copy of the persisted state.
    pub async fn snapshot(&self) -> PendingState {
        let _guard = self.lock.lock().await;
        self.store.load().await
    }

    /// Append addresses not already present, ignoring case and surrounding
    /// whitespace. Returns how many were added.
    ///
    /// Adding to a fully-sent campaign starts a new one: the completion flag
    /// is cleared so a fresh notice fires when the new recipients are done.
    pub async fn enqueue_many<I>(&self, addresses: I) -> Result<usize, StoreError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let candidates: Vec<String> = addresses
            .into_iter()
            .map(|a| a.as_ref().trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        let added = self
            .update(move |state| {
                let mut added = 0;
                for address in candidates {
                    if !state.contains(&address) {
                        state.recipients.push(PendingRecipient::new(address));
                        added += 1;
                    }
                }
                if added > 0 {
                    state.notification_sent = false;
                }
                added
            })
            .await?;

        if added > 0 {
            tracing::info!(added, "recipients enqueued");
        }
        Ok(added)
    }

    /// Up to `n` unsent recipients in stored order.
    ///
    /// Nothing is marked: a recipient only becomes sent through
    /// [`mark_sent`](Self::mark_sent) after the transport confirms delivery.
    pub async fn dequeue_batch(&self, n: usize) -> Vec<PendingRecipient> {
        let state = self.snapshot().await;
        state.unsent().take(n).cloned().collect()
    }

    pub async fn count_pending(&self) -> usize {
        self.snapshot().await.pending_count()
    }

    pub async fn summary(&self) -> QueueSummary {
        QueueSummary::from(&self.snapshot().await)
    }

    /// Record a confirmed delivery. Returns false if the address is unknown.
    pub async fn mark_sent(&self, address: &str) -> Result<bool, StoreError> {
        self.update(|state| {
            match state.recipients.iter_mut().find(|r| r.matches(address)) {
                Some(recipient) => {
                    recipient.sent = true;
                    true
                }
                None => false,
            }
        })
        .await
    }

    pub async fn set_next_run(&self, at: OffsetDateTime) -> Result<(), StoreError> {
        self.update(|state| state.next_run_at = Some(at)).await
    }

    pub async fn clear_next_run(&self) -> Result<(), StoreError> {
        self.update(|state| state.next_run_at = None).await
    }

    /// Set the completion flag, but only while the campaign is still complete.
    /// Returns whether the flag was set.
    pub async fn mark_notified(&self) -> Result<bool, StoreError> {
        self.update(|state| {
            if state.is_complete() {
                state.notification_sent = true;
                true
            } else {
                false
            }
        })
        .await
    }
}

//! Durable snapshot of campaign recipients and scheduling state.
//!
//! # Architecture
//!
//! - [`PendingState`] — The whole persisted artifact: recipients in insertion
//!   order, the backoff window and the completion flag.
//! - [`PendingStore`] — Backend-agnostic load/save of a full snapshot.
//! - [`JsonFileStore`] — A single JSON file, replaced atomically on save.
//! - [`MemoryStore`] — In-memory store for development and testing.
//!
//! A store is never mutated directly by callers that may race. Go through
//! [`RecipientQueue`](crate::queue::RecipientQueue), which serializes every
//! load-modify-save cycle.

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Snapshot layout version written by this crate.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One address of the current campaign and whether it has been delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecipient {
    pub address: String,
    #[serde(default)]
    pub sent: bool,
}

impl PendingRecipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            sent: false,
        }
    }

    /// Addresses compare case-insensitively, with full Unicode case folding.
    pub fn matches(&self, address: &str) -> bool {
        self.address == address || address_key(&self.address) == address_key(address)
    }
}

/// The form two addresses are compared in: `Ünal@x.com` and `ünal@X.COM`
/// share a key.
pub fn address_key(address: &str) -> String {
    address.to_lowercase()
}

/// The persisted campaign state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingState {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Insertion order, unique by case-insensitive address.
    #[serde(default)]
    pub recipients: Vec<PendingRecipient>,
    /// No sends may be attempted before this instant.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub next_run_at: Option<OffsetDateTime>,
    /// A completion notice was issued for the current fully-sent set.
    #[serde(default)]
    pub notification_sent: bool,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for PendingState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            recipients: Vec::new(),
            next_run_at: None,
            notification_sent: false,
        }
    }
}

impl PendingState {
    pub fn contains(&self, address: &str) -> bool {
        self.recipients.iter().any(|r| r.matches(address))
    }

    pub fn pending_count(&self) -> usize {
        self.recipients.iter().filter(|r| !r.sent).count()
    }

    pub fn sent_count(&self) -> usize {
        self.recipients.len() - self.pending_count()
    }

    /// True when there is at least one recipient and every one is sent.
    pub fn is_complete(&self) -> bool {
        !self.recipients.is_empty() && self.recipients.iter().all(|r| r.sent)
    }

    /// Unsent recipients in stored order.
    pub fn unsent(&self) -> impl Iterator<Item = &PendingRecipient> {
        self.recipients.iter().filter(|r| !r.sent)
    }

    /// Whether the backoff window is still open at `now`.
    pub fn in_backoff(&self, now: OffsetDateTime) -> bool {
        matches!(self.next_run_at, Some(at) if at > now)
    }
}

/// Backend-agnostic snapshot storage.
///
/// `try_load` yields [`PendingState::default`] for a missing snapshot and an
/// error when the snapshot exists but could not be read. `load` never fails
/// and is only for readers: a snapshot that failed to load must not be saved
/// back. `save` must replace the snapshot as a unit, so a crash mid-save
/// leaves either the old or the new snapshot readable.
#[async_trait]
pub trait PendingStore: Send + Sync + 'static {
    async fn try_load(&self) -> Result<PendingState, StoreError>;

    async fn save(&self, state: &PendingState) -> Result<(), StoreError>;

    async fn load(&self) -> PendingState {
        match self.try_load().await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "failed to load state, reading as empty");
                PendingState::default()
            }
        }
    }
}

#[async_trait]
impl<S: PendingStore> PendingStore for std::sync::Arc<S> {
    async fn try_load(&self) -> Result<PendingState, StoreError> {
        (**self).try_load().await
    }

    async fn save(&self, state: &PendingState) -> Result<(), StoreError> {
        (**self).save(state).await
    }
}

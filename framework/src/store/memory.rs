use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PendingState, PendingStore, StoreError};

/// In-memory [`PendingStore`] for development and testing.
///
/// The snapshot is kept as serialized JSON so loads go through the same
/// decoding path as the file store. Not durable.
#[derive(Clone, Default)]
pub struct MemoryStore {
    snapshot: Arc<Mutex<Option<Vec<u8>>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state.
    pub fn with_state(state: &PendingState) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(serde_json::to_vec_pretty(state).ok())),
            saves: Arc::default(),
        }
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The raw snapshot bytes, if anything was saved.
    pub async fn raw(&self) -> Option<Vec<u8>> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl PendingStore for MemoryStore {
    async fn try_load(&self) -> Result<PendingState, StoreError> {
        match self.snapshot.lock().await.as_deref() {
            Some(bytes) => Ok(serde_json::from_slice(bytes)?),
            None => Ok(PendingState::default()),
        }
    }

    async fn save(&self, state: &PendingState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        *self.snapshot.lock().await = Some(bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use batchmail::store::{MemoryStore, PendingRecipient, PendingState, PendingStore, StoreError};
use batchmail::RecipientQueue;
use time::OffsetDateTime;

/// Store whose reads fail with an I/O error while `unreadable` is set.
struct UnreadableStore {
    inner: MemoryStore,
    unreadable: AtomicBool,
}

impl UnreadableStore {
    fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            unreadable: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PendingStore for UnreadableStore {
    async fn try_load(&self) -> Result<PendingState, StoreError> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "input/output error").into());
        }
        self.inner.try_load().await
    }

    async fn save(&self, state: &PendingState) -> Result<(), StoreError> {
        self.inner.save(state).await
    }
}

fn addresses(state: &PendingState) -> Vec<&str> {
    state.recipients.iter().map(|r| r.address.as_str()).collect()
}

#[tokio::test]
async fn enqueue_dedups_case_insensitively() {
    let queue = RecipientQueue::new(MemoryStore::new());

    let added = queue
        .enqueue_many(["a@x.com", "A@X.com", "a@x.com"])
        .await
        .unwrap();

    assert_eq!(added, 1);
    let state = queue.snapshot().await;
    assert_eq!(addresses(&state), vec!["a@x.com"]);

    let added = queue
        .enqueue_many(["Ünal@x.com", "ünal@x.com", "ÜNAL@X.COM"])
        .await
        .unwrap();

    assert_eq!(added, 1);
    let state = queue.snapshot().await;
    assert_eq!(addresses(&state), vec!["a@x.com", "Ünal@x.com"]);
    assert!(queue.mark_sent("ünal@x.com").await.unwrap());
}

#[tokio::test]
async fn enqueue_keeps_insertion_order_and_skips_existing() {
    let queue = RecipientQueue::new(MemoryStore::new());
    queue.enqueue_many(["c@x.com", "a@x.com"]).await.unwrap();

    let added = queue
        .enqueue_many(["B@x.com", " C@X.COM ", "", "d@x.com"])
        .await
        .unwrap();

    assert_eq!(added, 2);
    let state = queue.snapshot().await;
    assert_eq!(addresses(&state), vec!["c@x.com", "a@x.com", "B@x.com", "d@x.com"]);
}

#[tokio::test]
async fn enqueue_without_news_does_not_save() {
    let store = MemoryStore::new();
    let queue = RecipientQueue::new(store.clone());
    queue.enqueue_many(["a@x.com"]).await.unwrap();
    assert_eq!(store.saves(), 1);

    queue.enqueue_many(["A@x.com"]).await.unwrap();
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn dequeue_is_pessimistic() {
    let queue = RecipientQueue::new(MemoryStore::new());
    queue
        .enqueue_many(["a@x.com", "b@x.com", "c@x.com"])
        .await
        .unwrap();
    queue.mark_sent("a@x.com").await.unwrap();

    let batch = queue.dequeue_batch(5).await;
    assert_eq!(
        batch,
        vec![PendingRecipient::new("b@x.com"), PendingRecipient::new("c@x.com")]
    );

    // Nothing was marked by withdrawing.
    assert_eq!(queue.count_pending().await, 2);
    assert_eq!(queue.dequeue_batch(1).await, vec![PendingRecipient::new("b@x.com")]);
}

#[tokio::test]
async fn mark_sent_matches_any_case() {
    let queue = RecipientQueue::new(MemoryStore::new());
    queue.enqueue_many(["Ann@x.com"]).await.unwrap();

    assert!(queue.mark_sent("ann@X.com").await.unwrap());
    assert!(!queue.mark_sent("nobody@x.com").await.unwrap());
    assert_eq!(queue.count_pending().await, 0);
}

#[tokio::test]
async fn new_recipients_restart_a_completed_campaign() {
    let queue = RecipientQueue::new(MemoryStore::new());
    queue.enqueue_many(["a@x.com"]).await.unwrap();
    queue.mark_sent("a@x.com").await.unwrap();
    assert!(queue.mark_notified().await.unwrap());
    assert!(queue.snapshot().await.notification_sent);

    queue.enqueue_many(["a@x.com"]).await.unwrap();
    assert!(queue.snapshot().await.notification_sent);

    queue.enqueue_many(["b@x.com"]).await.unwrap();
    assert!(!queue.snapshot().await.notification_sent);
}

#[tokio::test]
async fn mark_notified_requires_completion() {
    let queue = RecipientQueue::new(MemoryStore::new());
    assert!(!queue.mark_notified().await.unwrap());

    queue.enqueue_many(["a@x.com"]).await.unwrap();
    assert!(!queue.mark_notified().await.unwrap());
    assert!(!queue.snapshot().await.notification_sent);
}

#[tokio::test]
async fn backoff_window_set_and_clear() {
    let queue = RecipientQueue::new(MemoryStore::new());
    let at = OffsetDateTime::now_utc() + std::time::Duration::from_secs(60);

    queue.set_next_run(at).await.unwrap();
    assert_eq!(queue.summary().await.next_run_at, Some(at));

    queue.clear_next_run().await.unwrap();
    assert_eq!(queue.summary().await.next_run_at, None);
}

#[tokio::test]
async fn summary_counts() {
    let queue = RecipientQueue::new(MemoryStore::new());
    queue
        .enqueue_many(["a@x.com", "b@x.com", "c@x.com"])
        .await
        .unwrap();
    queue.mark_sent("b@x.com").await.unwrap();

    let summary = queue.summary().await;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.pending, 2);
    assert!(!summary.notification_sent);
}

#[tokio::test]
async fn concurrent_ingestion_and_delivery_lose_nothing() {
    let store = MemoryStore::new();
    let queue = RecipientQueue::new(store.clone());
    let seed: Vec<String> = (0..50).map(|i| format!("seed{i}@x.com")).collect();
    queue.enqueue_many(&seed).await.unwrap();

    let ingest = {
        let queue = queue.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                queue.enqueue_many([format!("new{i}@x.com")]).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    let deliver = {
        let queue = queue.clone();
        let seed = seed.clone();
        tokio::spawn(async move {
            for address in &seed {
                queue.mark_sent(address).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    ingest.await.unwrap();
    deliver.await.unwrap();

    let state = store.load().await;
    assert_eq!(state.recipients.len(), 100);
    assert_eq!(state.sent_count(), 50);
    assert!(state
        .recipients
        .iter()
        .all(|r| r.sent == r.address.starts_with("seed")));
}

#[tokio::test]
async fn unreadable_store_is_never_overwritten() {
    let seeded = PendingState {
        recipients: vec![PendingRecipient::new("a@x.com"), PendingRecipient::new("b@x.com")],
        ..Default::default()
    };
    let memory = MemoryStore::with_state(&seeded);
    let store = UnreadableStore::new(memory.clone());
    let queue = RecipientQueue::new(store.clone());

    store.unreadable.store(true, Ordering::SeqCst);
    let later = OffsetDateTime::now_utc() + std::time::Duration::from_secs(60);
    assert!(matches!(queue.set_next_run(later).await, Err(StoreError::Io(_))));
    assert!(queue.enqueue_many(["c@x.com"]).await.is_err());
    assert!(queue.mark_sent("a@x.com").await.is_err());
    assert!(queue.mark_notified().await.is_err());

    // Readers see an empty campaign, but nothing was written.
    assert_eq!(queue.count_pending().await, 0);
    assert_eq!(memory.saves(), 0);

    store.unreadable.store(false, Ordering::SeqCst);
    assert_eq!(queue.snapshot().await, seeded);
}

//! HTTP ingestion of recipient lists.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/api/recipients` | `{"addresses": ["a@example.com", ...]}` |
//! | `GET` | `/api/status` | — |
//!
//! Addresses are trimmed, validated and deduplicated here before they reach
//! the [`RecipientQueue`].

use std::collections::HashSet;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::queue::{QueueSummary, RecipientQueue};
use crate::store::{address_key, PendingStore};

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueResponse {
    /// Valid, distinct addresses in the request.
    pub received: usize,
    /// Of those, how many were new to the campaign.
    pub added: usize,
    pub rejected: Vec<String>,
    pub pending: usize,
}

/// Result of screening candidate addresses.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Screened {
    pub valid: Vec<String>,
    pub rejected: Vec<String>,
}

/// Trim, validate with lettre's address parser and drop case-insensitive
/// duplicates, keeping first occurrences in order. Blank entries are ignored.
pub fn screen_addresses<I>(candidates: I) -> Screened
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut screened = Screened::default();

    for candidate in candidates {
        let address = candidate.as_ref().trim();
        if address.is_empty() {
            continue;
        }
        if address.parse::<lettre::Address>().is_err() {
            screened.rejected.push(address.to_string());
            continue;
        }
        if seen.insert(address_key(address)) {
            screened.valid.push(address.to_string());
        }
    }

    screened
}

pub fn router<S: PendingStore>(queue: RecipientQueue<S>) -> Router {
    Router::new()
        .route("/api/recipients", post(enqueue::<S>))
        .route("/api/status", get(status::<S>))
        .with_state(queue)
}

pub async fn enqueue<S: PendingStore>(
    State(queue): State<RecipientQueue<S>>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, IngestError> {
    let Screened { valid, rejected } = screen_addresses(&request.addresses);
    if valid.is_empty() {
        return Err(IngestError::NoValidAddresses { rejected });
    }

    let received = valid.len();
    let added = queue.enqueue_many(valid).await?;
    let pending = queue.count_pending().await;

    tracing::info!(received, added, rejected = rejected.len(), pending, "recipient list ingested");
    Ok(Json(EnqueueResponse {
        received,
        added,
        rejected,
        pending,
    }))
}

pub async fn status<S: PendingStore>(State(queue): State<RecipientQueue<S>>) -> Json<QueueSummary> {
    Json(queue.summary().await)
}

//! The background loop that turns pending recipients into sends.
//!
//! Each pass ([`Dispatcher::tick`]) reloads the persisted state and does one
//! of the following:
//!
//! - nothing is unsent: issue the completion notice once, otherwise stay idle
//! - a backoff window is open: wait it out
//! - a backoff window has elapsed: clear it, send a resume notice, then send
//! - otherwise send: fetch content once, then attempt each unsent recipient
//!   in stored order, persisting every confirmed delivery immediately
//!
//! A rate-limit refusal opens a backoff window and ends the pass. Any other
//! failure leaves the recipient unsent for a later pass. The loop only waits
//! at three points (poll, inter-message delay, backoff) and each of them
//! returns early on [`Shutdown`]. A send that has started always finishes and
//! is recorded before the stop is honoured.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::content::{Content, ContentSource};
use crate::mail::{SendError, Transport};
use crate::notify::Notifier;
use crate::queue::RecipientQueue;
use crate::shutdown::Shutdown;
use crate::store::PendingStore;

/// Longest window a backoff or batch pause may open. Longer settings are
/// clamped to it.
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// End of a window of `span` starting at `now`, with `span` clamped to
/// [`MAX_WINDOW`].
pub fn window_end(now: OffsetDateTime, span: Duration) -> OffsetDateTime {
    now + span.min(MAX_WINDOW)
}

/// Timing and batching knobs for the [`Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Delay between passes when there is nothing to do.
    pub poll_interval: Duration,
    /// Delay between two sends within a pass.
    pub send_delay: Duration,
    /// Backoff window opened by a rate-limit refusal.
    pub cooldown: Duration,
    /// Most recipients attempted in one pass.
    pub batch_size: usize,
    /// If set, a window of this length is opened after each full batch while
    /// recipients remain.
    pub batch_pause: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            send_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(60 * 60),
            batch_size: 500,
            batch_pause: None,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// No unsent recipients and nothing to announce.
    Idle,
    /// Sends are held until `until`.
    Backoff { until: OffsetDateTime },
    /// Every recipient was already sent; the completion notice went out.
    Completed,
    /// A sending pass ran to the end of its batch.
    Sent {
        sent: usize,
        failed: usize,
        remaining: usize,
        completed: bool,
    },
    /// The provider refused a send; the pass stopped and a window was opened.
    RateLimited { sent: usize, until: OffsetDateTime },
    /// The state could not be persisted; the pass stopped early.
    StoreFailed,
    /// Shutdown was requested between sends.
    Interrupted,
}

impl Tick {
    /// How long to wait before the next pass.
    pub fn wait(&self, now: OffsetDateTime, poll_interval: Duration) -> Duration {
        match self {
            Tick::Backoff { until } | Tick::RateLimited { until, .. } => {
                Duration::try_from(*until - now)
                    .unwrap_or_default()
                    .min(poll_interval)
            }
            _ => poll_interval,
        }
    }
}

/// Drives sends from a [`RecipientQueue`].
///
/// ```ignore
/// let handle = Dispatcher::new(queue, content, mailer)
///     .notify_address(Some("ops@example.com".into()))
///     .config(settings.dispatch_config())
///     .start(shutdown);
/// ```
pub struct Dispatcher<S, C, T> {
    queue: RecipientQueue<S>,
    content: C,
    transport: Arc<T>,
    notifier: Notifier<T>,
    config: DispatchConfig,
}

impl<S, C, T> Dispatcher<S, C, T>
where
    S: PendingStore,
    C: ContentSource,
    T: Transport,
{
    pub fn new(queue: RecipientQueue<S>, content: C, transport: T) -> Self {
        let transport = Arc::new(transport);
        Self {
            queue,
            content,
            notifier: Notifier::new(transport.clone(), None),
            transport,
            config: DispatchConfig::default(),
        }
    }

    /// Operator mailbox for completion and resume notices (default: none).
    pub fn notify_address(mut self, address: Option<String>) -> Self {
        self.notifier = Notifier::new(self.transport.clone(), address);
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue(&self) -> &RecipientQueue<S> {
        &self.queue
    }

    /// Spawn [`run`](Self::run) on the tokio runtime.
    pub fn start(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Loop until `shutdown` fires.
    pub async fn run(self, mut shutdown: Shutdown) {
        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            send_delay = ?self.config.send_delay,
            cooldown = ?self.config.cooldown,
            batch_size = self.config.batch_size,
            "dispatcher running"
        );

        while !shutdown.is_triggered() {
            let tick = self.tick(&mut shutdown).await;
            if tick == Tick::Interrupted {
                break;
            }

            let wait = tick.wait(OffsetDateTime::now_utc(), self.config.poll_interval);
            if shutdown.sleep(wait).await {
                break;
            }
        }

        tracing::info!("dispatcher stopped");
    }

    /// One pass over the persisted state.
    pub async fn tick(&self, shutdown: &mut Shutdown) -> Tick {
        let state = self.queue.snapshot().await;
        let pending = state.pending_count();

        if pending == 0 {
            if state.is_complete() && !state.notification_sent {
                self.announce_completion(state.recipients.len()).await;
                return Tick::Completed;
            }
            return Tick::Idle;
        }

        if let Some(until) = state.next_run_at {
            if state.in_backoff(OffsetDateTime::now_utc()) {
                tracing::debug!(%until, pending, "in backoff window");
                return Tick::Backoff { until };
            }

            if let Err(e) = self.queue.clear_next_run().await {
                tracing::error!(error = %e, "failed to clear backoff window");
                return Tick::StoreFailed;
            }
            tracing::info!(pending, "backoff window elapsed, resuming");
            self.notifier.resumed(pending).await;
        }

        self.send_pass(shutdown).await
    }

    async fn send_pass(&self, shutdown: &mut Shutdown) -> Tick {
        let content = match self.content.fetch().await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "content fetch failed, using fallback");
                Content::fallback()
            }
        };

        let batch = self.queue.dequeue_batch(self.config.batch_size).await;
        tracing::info!(count = batch.len(), subject = %content.subject, "sending batch");

        let mut sent = 0;
        let mut failed = 0;

        for (i, recipient) in batch.iter().enumerate() {
            if i > 0 && shutdown.sleep(self.config.send_delay).await {
                tracing::info!(sent, "shutdown requested mid-batch");
                return Tick::Interrupted;
            }
            if shutdown.is_triggered() {
                return Tick::Interrupted;
            }

            let address = recipient.address.as_str();
            match self.transport.send(&content.render_for(address)).await {
                Ok(()) => match self.queue.mark_sent(address).await {
                    Ok(true) => {
                        sent += 1;
                        tracing::info!(%address, "sent");
                    }
                    Ok(false) => {
                        tracing::error!(%address, "sent but recipient is no longer stored");
                        return Tick::StoreFailed;
                    }
                    Err(e) => {
                        tracing::error!(%address, error = %e, "sent but failed to record delivery");
                        return Tick::StoreFailed;
                    }
                },
                Err(SendError::RateLimited(reason)) => {
                    let until = window_end(OffsetDateTime::now_utc(), self.config.cooldown);
                    tracing::warn!(%address, %reason, %until, sent, "rate limited, backing off");
                    if let Err(e) = self.queue.set_next_run(until).await {
                        tracing::error!(error = %e, "failed to persist backoff window");
                        return Tick::StoreFailed;
                    }
                    return Tick::RateLimited { sent, until };
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(%address, error = %e, "send failed, will retry");
                }
            }
        }

        let state = self.queue.snapshot().await;
        let remaining = state.pending_count();
        let mut completed = false;

        if state.is_complete() && !state.notification_sent {
            self.announce_completion(state.recipients.len()).await;
            completed = true;
        } else if let Some(pause) = self.config.batch_pause {
            if remaining > 0 && batch.len() >= self.config.batch_size {
                let until = window_end(OffsetDateTime::now_utc(), pause);
                tracing::info!(%until, remaining, "batch finished, pausing");
                if let Err(e) = self.queue.set_next_run(until).await {
                    tracing::error!(error = %e, "failed to persist batch pause");
                    return Tick::StoreFailed;
                }
            }
        }

        tracing::info!(sent, failed, remaining, "pass finished");
        Tick::Sent {
            sent,
            failed,
            remaining,
            completed,
        }
    }

    async fn announce_completion(&self, total: usize) {
        tracing::info!(total, "all recipients sent");
        self.notifier.campaign_complete(total).await;
        if let Err(e) = self.queue.mark_notified().await {
            tracing::error!(error = %e, "failed to record completion notice");
        }
    }
}

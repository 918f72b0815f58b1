//! Cooperative stop signal for background loops.

use std::time::Duration;

use tokio::sync::watch;

/// Triggers every [`Shutdown`] cloned from the same channel.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Observes a stop request. Dropping the handle also counts as a request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once a stop is requested.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration` unless a stop arrives first. Returns `true` when
    /// interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.triggered() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_without_trigger() {
        let (_handle, mut shutdown) = channel();
        assert!(!shutdown.sleep(Duration::from_millis(5)).await);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn trigger_interrupts_sleep() {
        let (handle, mut shutdown) = channel();
        let sleeper = tokio::spawn(async move { shutdown.sleep(Duration::from_secs(3600)).await });
        handle.trigger();
        assert!(sleeper.await.unwrap());
    }

    #[tokio::test]
    async fn dropped_handle_counts_as_trigger() {
        let (handle, mut shutdown) = channel();
        drop(handle);
        assert!(shutdown.is_triggered());
        assert!(shutdown.sleep(Duration::from_secs(3600)).await);
    }
}

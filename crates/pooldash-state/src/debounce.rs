//! Search-query debouncing

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Dispatches a query only after `quiet` has passed without a newer one.
///
/// Must be used from within a tokio runtime.
pub struct Debouncer {
    quiet: Duration,
    tx: mpsc::UnboundedSender<String>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                quiet,
                tx,
                pending: Mutex::new(None),
            },
            rx,
        )
    }

    /// Record a keystroke; cancels any dispatch still waiting
    pub fn push(&self, query: impl Into<String>) {
        let query = query.into();
        let tx = self.tx.clone();
        let quiet = self.quiet;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            debug!(query = %query, "Dispatching search");
            let _ = tx.send(query);
        });

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Drop any waiting dispatch
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_only_last_keystroke_is_dispatched() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(300));

        debouncer.push("g");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.push("gp");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.push("gpu");

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.recv().await.as_deref(), Some("gpu"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_dispatch() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(300));
        debouncer.push("llama");
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }
}

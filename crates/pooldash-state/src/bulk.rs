//! Sequential bulk operations with per-item failure collection

use pooldash_core::PoolResult;
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, warn};

/// One failed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub item: String,
    pub reason: String,
}

/// Result of a bulk run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub attempted: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Every failure as `item: reason`, joined by `; `
    pub fn failure_list(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.item, f.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Run `op` over `items` one at a time.
///
/// A failing item is recorded and the run carries on with the next one.
pub async fn run_sequential<T, N, F, Fut>(items: Vec<T>, name: N, mut op: F) -> BulkOutcome
where
    N: Fn(&T) -> String,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = PoolResult<()>>,
{
    let mut outcome = BulkOutcome {
        attempted: items.len(),
        failures: Vec::new(),
    };

    for item in items {
        let item_name = name(&item);
        match op(item).await {
            Ok(()) => debug!(item = %item_name, "Bulk item done"),
            Err(e) => {
                warn!(item = %item_name, error = %e, "Bulk item failed");
                outcome.failures.push(BulkFailure {
                    item: item_name,
                    reason: e.user_message(),
                });
            }
        }
    }

    info!(
        attempted = outcome.attempted,
        failed = outcome.failures.len(),
        "Bulk operation finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooldash_core::PoolError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failures_do_not_abort_the_run() {
        let items: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let outcome = run_sequential(items, |s| s.clone(), |s| async move {
            match s.as_str() {
                "b" => Err(PoolError::Backend("job is locked".into())),
                "d" => Err(PoolError::Transport("connection reset".into())),
                _ => Ok(()),
            }
        })
        .await;

        assert_eq!(outcome.attempted, 4);
        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(
            outcome.failure_list(),
            "b: job is locked; d: Transport error: connection reset"
        );
    }

    #[tokio::test]
    async fn test_items_run_one_at_a_time() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcome = run_sequential((0..5).collect(), |i: &u32| i.to_string(), |_| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(outcome.is_success());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}

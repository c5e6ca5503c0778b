//! Loadable panel state with generation stamping
//!
//! Every load takes a [`Ticket`]. Only the result carrying the most recently
//! issued ticket is applied, so a slow response to an older load can never
//! overwrite a newer one. A failed read keeps whatever data was already shown.

use pooldash_core::PoolResult;
use tracing::{debug, warn};

/// Load generation handed out by [`Panel::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// What happened to a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The result is now displayed
    Applied,
    /// A newer load superseded this one
    Stale,
    /// Not issued; the panel's inputs are not ready
    Skipped,
}

/// Data, loading flag and error slot of one panel
#[derive(Debug, Clone)]
pub struct Panel<T> {
    name: &'static str,
    data: Option<T>,
    loading: bool,
    error: Option<String>,
    issued: u64,
}

impl<T> Panel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            data: None,
            loading: false,
            error: None,
            issued: 0,
        }
    }

    /// Start a load; supersedes any load still in flight
    pub fn begin(&mut self) -> Ticket {
        self.issued += 1;
        self.loading = true;
        debug!(panel = self.name, generation = self.issued, "Load started");
        Ticket(self.issued)
    }

    /// Apply a load result.
    ///
    /// A stale result is dropped, error included. A current error is recorded
    /// in the error slot and handed back to the caller.
    pub fn complete(&mut self, ticket: Ticket, result: PoolResult<T>) -> PoolResult<LoadOutcome> {
        if ticket.0 != self.issued {
            debug!(
                panel = self.name,
                generation = ticket.0,
                latest = self.issued,
                "Dropping stale result"
            );
            return Ok(LoadOutcome::Stale);
        }

        self.loading = false;
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                Ok(LoadOutcome::Applied)
            }
            Err(e) => {
                warn!(panel = self.name, error = %e, "Load failed");
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Forget in-flight loads without touching the data
    pub fn cancel(&mut self) {
        self.issued += 1;
        self.loading = false;
    }

    /// Drop data and error, and forget in-flight loads
    pub fn reset(&mut self) {
        self.cancel();
        self.data = None;
        self.error = None;
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooldash_core::PoolError;

    #[test]
    fn test_stale_result_is_dropped() {
        let mut panel: Panel<Vec<u32>> = Panel::new("test");
        let old = panel.begin();
        let new = panel.begin();

        assert_eq!(panel.complete(new, Ok(vec![2])).unwrap(), LoadOutcome::Applied);
        assert_eq!(panel.complete(old, Ok(vec![1])).unwrap(), LoadOutcome::Stale);
        assert_eq!(panel.data(), Some(&vec![2]));
        assert!(!panel.is_loading());
    }

    #[test]
    fn test_error_keeps_previous_data() {
        let mut panel: Panel<u32> = Panel::new("test");
        let t = panel.begin();
        panel.complete(t, Ok(7)).unwrap();

        let t = panel.begin();
        let err = panel
            .complete(t, Err(PoolError::Backend("timeout talking to k8s".into())))
            .unwrap_err();
        assert!(matches!(err, PoolError::Backend(_)));
        assert_eq!(panel.data(), Some(&7));
        assert_eq!(panel.error(), Some("timeout talking to k8s"));

        let t = panel.begin();
        panel.complete(t, Ok(8)).unwrap();
        assert!(panel.error().is_none());
    }

    #[test]
    fn test_cancel_invalidates_in_flight_load() {
        let mut panel: Panel<u32> = Panel::new("test");
        let t = panel.begin();
        panel.cancel();
        assert_eq!(panel.complete(t, Ok(1)).unwrap(), LoadOutcome::Stale);
        assert!(panel.data().is_none());
    }
}

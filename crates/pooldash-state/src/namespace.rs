//! Namespace filter shared by the job and service views
//!
//! The filter starts uninitialized and nothing that depends on it may be
//! fetched until it resolves. Automatic resolution happens at most once per
//! session; after that only explicit selection changes it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, info};

/// Current value of the namespace filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Default not known yet; dependent reads must wait
    #[default]
    Uninitialized,
    /// No filter
    All,
    Specific(String),
}

impl NamespaceScope {
    pub fn is_initialized(&self) -> bool {
        !matches!(self, NamespaceScope::Uninitialized)
    }

    /// Namespace argument for a scoped read.
    ///
    /// `None` means the read must not be issued yet, `Some(None)` means all
    /// namespaces.
    pub fn fetch_scope(&self) -> Option<Option<&str>> {
        match self {
            NamespaceScope::Uninitialized => None,
            NamespaceScope::All => Some(None),
            NamespaceScope::Specific(ns) => Some(Some(ns.as_str())),
        }
    }

    /// Namespace to force on writes, if one is selected
    pub fn forced_namespace(&self) -> Option<String> {
        match self {
            NamespaceScope::Specific(ns) => Some(ns.clone()),
            _ => None,
        }
    }

    /// Whether a record owned by `namespace` is visible under this filter
    pub fn admits(&self, namespace: &str) -> bool {
        match self {
            NamespaceScope::Uninitialized => false,
            NamespaceScope::All => true,
            NamespaceScope::Specific(ns) => ns == namespace,
        }
    }
}

impl fmt::Display for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceScope::Uninitialized => write!(f, "(pending)"),
            NamespaceScope::All => write!(f, "all"),
            NamespaceScope::Specific(ns) => write!(f, "{}", ns),
        }
    }
}

/// Session-wide namespace filter
#[derive(Debug)]
pub struct NamespaceFilter {
    scope: watch::Sender<NamespaceScope>,
    auto_resolved: AtomicBool,
}

impl Default for NamespaceFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceFilter {
    pub fn new() -> Self {
        let (scope, _) = watch::channel(NamespaceScope::Uninitialized);
        Self {
            scope,
            auto_resolved: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> NamespaceScope {
        self.scope.borrow().clone()
    }

    /// Watch for filter changes
    pub fn subscribe(&self) -> watch::Receiver<NamespaceScope> {
        self.scope.subscribe()
    }

    /// One-shot automatic resolution.
    ///
    /// Resolves to the operator's default namespace as soon as it is known,
    /// or to all namespaces once the connection state has loaded with an
    /// empty namespace list. Returns true only on the call that resolved it.
    pub fn auto_resolve(&self, default: Option<&str>, loaded: bool, namespaces: &[String]) -> bool {
        if self.auto_resolved.load(Ordering::Acquire) {
            return false;
        }

        let resolved = match default {
            Some(ns) => NamespaceScope::Specific(ns.to_string()),
            None if loaded && namespaces.is_empty() => NamespaceScope::All,
            None => {
                debug!("Namespace default not known yet");
                return false;
            }
        };

        if self
            .auto_resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        info!(namespace = %resolved, "Namespace filter initialized");
        self.scope.send_replace(resolved);
        true
    }

    /// Explicit selection by the operator; `None` selects all namespaces.
    /// Disables automatic resolution for the rest of the session.
    pub fn select(&self, namespace: Option<String>) {
        self.auto_resolved.store(true, Ordering::Release);
        let scope = match namespace {
            Some(ns) => NamespaceScope::Specific(ns),
            None => NamespaceScope::All,
        };
        info!(namespace = %scope, "Namespace filter selected");
        self.scope.send_replace(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaces(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_uninitialized_blocks_fetch() {
        let filter = NamespaceFilter::new();
        assert_eq!(filter.current().fetch_scope(), None);
        assert!(!filter.current().admits("alice"));
    }

    #[test]
    fn test_default_namespace_resolves_once() {
        let filter = NamespaceFilter::new();
        let list = spaces(&["alice", "bob"]);

        assert!(!filter.auto_resolve(None, false, &list));
        assert!(filter.auto_resolve(Some("alice"), true, &list));
        assert_eq!(filter.current(), NamespaceScope::Specific("alice".into()));

        // A later, different default does not re-trigger
        assert!(!filter.auto_resolve(Some("bob"), true, &list));
        assert_eq!(filter.current().fetch_scope(), Some(Some("alice")));
    }

    #[test]
    fn test_empty_namespace_list_resolves_to_all() {
        let filter = NamespaceFilter::new();
        assert!(!filter.auto_resolve(None, false, &[]));
        assert_eq!(filter.current(), NamespaceScope::Uninitialized);

        assert!(filter.auto_resolve(None, true, &[]));
        assert_eq!(filter.current(), NamespaceScope::All);
        assert_eq!(filter.current().fetch_scope(), Some(None));
    }

    #[test]
    fn test_explicit_selection_disables_auto_resolution() {
        let filter = NamespaceFilter::new();
        filter.select(None);
        assert!(!filter.auto_resolve(Some("alice"), true, &spaces(&["alice"])));
        assert_eq!(filter.current(), NamespaceScope::All);

        filter.select(Some("bob".into()));
        assert_eq!(filter.current().forced_namespace().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_subscribers_see_resolution() {
        let filter = NamespaceFilter::new();
        let mut rx = filter.subscribe();
        filter.auto_resolve(Some("alice"), true, &[]);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), NamespaceScope::Specific("alice".into()));
    }
}

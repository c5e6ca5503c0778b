//! Pool services filtered by the namespace filter

use pooldash_core::{PoolResult, Service};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::panel::{LoadOutcome, Panel};
use crate::session::AppState;

/// Shown when the filter leaves nothing visible
pub const NO_SERVICES: &str = "No services in this namespace";

pub struct ServiceBoard {
    state: Arc<AppState>,
    panel: RwLock<Panel<Vec<Service>>>,
}

impl ServiceBoard {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            panel: RwLock::new(Panel::new("services")),
        }
    }

    /// Fetch all pool services; waits for the namespace filter like the job list
    pub async fn load(&self) -> PoolResult<LoadOutcome> {
        if !self.state.namespace().current().is_initialized() {
            debug!("Namespace filter pending, not loading services");
            return Ok(LoadOutcome::Skipped);
        }
        let ticket = self.panel.write().await.begin();
        let result = self.state.api().fetch_pool_services().await;
        self.panel.write().await.complete(ticket, result)
    }

    /// Services visible under the current filter
    pub async fn visible(&self) -> Vec<Service> {
        let scope = self.state.namespace().current();
        self.panel
            .read()
            .await
            .data()
            .map(|services| {
                services
                    .iter()
                    .filter(|s| scope.admits(&s.namespace))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn error(&self) -> Option<String> {
        self.panel.read().await.error().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{PreferenceStore, Preferences};
    use pooldash_client::{MockPool, MockPoolApi};
    use pooldash_core::UiConfig;
    use serde_json::json;

    fn board() -> (MockPoolApi, ServiceBoard) {
        let services = Service::from_pool_services(json!({
            "kalavai": [{
                "name": "watcher",
                "endpoints": {"api": {"internal": "watcher:8000", "external": "10.0.0.1:30080"}}
            }],
            "alice": [{"name": "litellm", "endpoints": {"http": {"internal": "litellm:4000"}}}]
        }))
        .unwrap();
        let api = MockPoolApi::new(MockPool {
            services,
            ..Default::default()
        });
        let state = AppState::new(
            Arc::new(api.clone()),
            UiConfig::default(),
            PreferenceStore::in_memory(Preferences::default()),
        );
        (api, ServiceBoard::new(Arc::new(state)))
    }

    #[tokio::test]
    async fn test_waits_for_namespace_filter() {
        let (api, board) = board();
        assert_eq!(board.load().await.unwrap(), LoadOutcome::Skipped);
        assert_eq!(api.count("fetch_pool_services"), 0);
    }

    #[tokio::test]
    async fn test_filtered_client_side() {
        let (api, board) = board();
        board.state.select_namespace(None);
        board.load().await.unwrap();
        assert_eq!(board.visible().await.len(), 2);

        board.state.select_namespace(Some("alice".into()));
        let visible = board.visible().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "litellm");
        assert_eq!(api.count("fetch_pool_services"), 1);

        board.state.select_namespace(Some("bob".into()));
        assert!(board.visible().await.is_empty());
    }
}

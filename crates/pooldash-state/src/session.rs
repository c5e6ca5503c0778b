//! Session-scoped application state
//!
//! [`AppState`] is injected into every component. The connection snapshot,
//! the namespace filter and the preferences are only changed through the
//! methods here.

use futures::try_join;
use pooldash_client::PoolApi;
use pooldash_core::{PoolError, PoolResult, PoolStatus, Quota, QuotaLimits, UiConfig};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::namespace::{NamespaceFilter, NamespaceScope};
use crate::prefs::PreferenceStore;

/// Connectivity, namespaces and quota of the current session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// Set once the first connection load has finished
    pub loaded: bool,
    pub status: PoolStatus,
    pub user_spaces: Vec<String>,
    pub selected_user_space: Option<String>,
    /// Quota of the selected namespace; `None` when it has none
    pub quota: Option<Quota>,
}

/// Login state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub logged_in: bool,
    pub error: Option<String>,
}

/// Application state container
pub struct AppState {
    api: Arc<dyn PoolApi>,
    ui: UiConfig,
    connection: RwLock<ConnectionState>,
    auth: RwLock<AuthState>,
    namespace: NamespaceFilter,
    prefs: PreferenceStore,
}

impl AppState {
    pub fn new(api: Arc<dyn PoolApi>, ui: UiConfig, prefs: PreferenceStore) -> Self {
        Self {
            api,
            ui,
            connection: RwLock::new(ConnectionState::default()),
            auth: RwLock::new(AuthState::default()),
            namespace: NamespaceFilter::new(),
            prefs,
        }
    }

    pub fn api(&self) -> &dyn PoolApi {
        self.api.as_ref()
    }

    pub fn ui(&self) -> &UiConfig {
        &self.ui
    }

    pub fn namespace(&self) -> &NamespaceFilter {
        &self.namespace
    }

    pub fn prefs(&self) -> &PreferenceStore {
        &self.prefs
    }

    pub async fn connection(&self) -> ConnectionState {
        self.connection.read().await.clone()
    }

    /// Load connectivity and namespaces, pick the default namespace and
    /// load its quota. Resolves the namespace filter when possible.
    pub async fn load_connection_state(&self) -> PoolResult<()> {
        let result = try_join!(self.api.is_connected(), self.api.get_available_user_spaces());

        let (connected, spaces) = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Failed to load connection state");
                self.connection.write().await.loaded = true;
                return Err(e);
            }
        };

        let selected = {
            let mut conn = self.connection.write().await;
            conn.status.connected = connected;
            conn.user_spaces = spaces;
            conn.loaded = true;
            if conn.selected_user_space.is_none() {
                conn.selected_user_space = conn.user_spaces.first().cloned();
            }
            info!(
                connected = connected,
                namespaces = conn.user_spaces.len(),
                "Connection state loaded"
            );
            conn.selected_user_space.clone()
        };

        // The filter must not wait on the quota round trip
        self.resolve_namespace().await;
        if let Some(space) = &selected {
            self.load_quota(space).await;
        }
        Ok(())
    }

    /// Select the operator's namespace and load its quota
    pub async fn set_user_space(&self, space: &str) {
        {
            let mut conn = self.connection.write().await;
            conn.selected_user_space = Some(space.to_string());
            conn.quota = None;
        }
        self.resolve_namespace().await;
        self.load_quota(space).await;
    }

    async fn load_quota(&self, space: &str) {
        match self.api.get_user_space_quota(space).await {
            Ok(quota) => {
                let mut conn = self.connection.write().await;
                // The selection may have moved on while the quota was loading
                if conn.selected_user_space.as_deref() == Some(space) {
                    conn.quota = quota;
                }
            }
            Err(e) => warn!(namespace = space, error = %e, "Failed to load quota"),
        }
    }

    async fn resolve_namespace(&self) {
        let conn = self.connection.read().await;
        self.namespace.auto_resolve(
            conn.selected_user_space.as_deref(),
            conn.loaded,
            &conn.user_spaces,
        );
    }

    /// Explicit namespace filter change
    pub fn select_namespace(&self, namespace: Option<String>) -> NamespaceScope {
        self.namespace.select(namespace);
        self.namespace.current()
    }

    /// Refresh agent, connectivity and server flags
    pub async fn refresh_status(&self) -> PoolResult<PoolStatus> {
        let (agent_running, connected, is_server) = try_join!(
            self.api.is_agent_running(),
            self.api.is_connected(),
            self.api.is_server()
        )
        .map_err(|e| {
            warn!(error = %e, "Failed to refresh status");
            e
        })?;

        let status = PoolStatus {
            connected,
            agent_running,
            is_server,
        };
        self.connection.write().await.status = status;
        debug!(?status, "Status refreshed");
        Ok(status)
    }

    pub async fn pause_agent(&self) -> PoolResult<PoolStatus> {
        self.api.pause_agent().await?;
        info!("Agent paused");
        self.refresh_status().await
    }

    pub async fn resume_agent(&self) -> PoolResult<PoolStatus> {
        self.api.resume_agent().await?;
        info!("Agent resumed");
        self.refresh_status().await
    }

    /// Write a namespace quota and read it back when it is the selected one
    pub async fn set_quota(&self, space: &str, limits: &QuotaLimits) -> PoolResult<()> {
        if space.trim().is_empty() {
            return Err(PoolError::Validation("Namespace is required".to_string()));
        }
        if limits.is_empty() {
            return Err(PoolError::Validation("At least one limit is required".to_string()));
        }

        self.api.set_user_space_quota(space, &limits.to_map()).await?;
        info!(namespace = space, "Quota updated");

        let selected = self.connection.read().await.selected_user_space.clone();
        if selected.as_deref() == Some(space) {
            self.load_quota(space).await;
        }
        Ok(())
    }

    /// Check an entered key against the configured access key.
    ///
    /// With no access key configured every key is accepted.
    pub async fn authorize(&self, user_key: &str) -> bool {
        let access_key = self.prefs.get().await.access_key;
        let granted = match access_key.as_deref() {
            None | Some("") => true,
            Some(expected) => expected == user_key,
        };

        let mut auth = self.auth.write().await;
        auth.logged_in = granted;
        auth.error = if granted {
            None
        } else {
            warn!("Rejected access key");
            Some("Invalid user key".to_string())
        };
        granted
    }

    pub async fn sign_out(&self) {
        *self.auth.write().await = AuthState::default();
        info!("Signed out");
    }

    pub async fn auth(&self) -> AuthState {
        self.auth.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pooldash_client::{MockFailure, MockPool, MockPoolApi};
    use pooldash_core::QuotaMeter;
    use crate::prefs::Preferences;

    fn state(api: &MockPoolApi) -> AppState {
        AppState::new(
            Arc::new(api.clone()),
            UiConfig::default(),
            PreferenceStore::in_memory(Preferences::default()),
        )
    }

    fn quota(cpu_used: u64, cpu_max: u64) -> Quota {
        Quota {
            cpu: QuotaMeter { used: cpu_used, max: cpu_max },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_namespace_becomes_default() {
        let api = MockPoolApi::new(MockPool {
            connected: true,
            spaces: vec!["alice".into(), "bob".into()],
            quotas: [("alice".to_string(), quota(2, 8))].into_iter().collect(),
            ..Default::default()
        });
        let state = state(&api);

        state.load_connection_state().await.unwrap();
        let conn = state.connection().await;
        assert!(conn.loaded);
        assert!(conn.status.connected);
        assert_eq!(conn.selected_user_space.as_deref(), Some("alice"));
        assert_eq!(conn.quota.map(|q| q.cpu.ratio()), Some(25));
        assert_eq!(state.namespace().current(), NamespaceScope::Specific("alice".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_resolves_before_quota_arrives() {
        let api = MockPoolApi::new(MockPool {
            connected: true,
            spaces: vec!["alice".into()],
            quotas: [("alice".to_string(), quota(1, 4))].into_iter().collect(),
            ..Default::default()
        });
        api.set_latency("get_user_space_quota", std::time::Duration::from_secs(2));
        let state = Arc::new(state(&api));

        let loading = tokio::spawn({
            let state = state.clone();
            async move { state.load_connection_state().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert_eq!(state.namespace().current(), NamespaceScope::Specific("alice".into()));
        assert!(state.connection().await.quota.is_none());

        loading.await.unwrap().unwrap();
        assert_eq!(state.connection().await.quota.map(|q| q.cpu.max), Some(4));
    }

    #[tokio::test]
    async fn test_no_namespaces_resolves_filter_to_all() {
        let api = MockPoolApi::new(MockPool {
            connected: true,
            ..Default::default()
        });
        let state = state(&api);

        state.load_connection_state().await.unwrap();
        assert_eq!(state.namespace().current(), NamespaceScope::All);
        assert_eq!(api.count("get_user_space_quota"), 0);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_filter_pending() {
        let api = MockPoolApi::default();
        api.fail("get_available_user_spaces", MockFailure::Transport("refused".into()));
        let state = state(&api);

        assert!(state.load_connection_state().await.is_err());
        assert_eq!(state.namespace().current(), NamespaceScope::Uninitialized);
    }

    #[tokio::test]
    async fn test_agent_pause_refreshes_status() {
        let api = MockPoolApi::new(MockPool {
            connected: true,
            agent_running: true,
            ..Default::default()
        });
        let state = state(&api);

        let status = state.pause_agent().await.unwrap();
        assert!(!status.agent_running);
        assert_eq!(state.connection().await.status, status);

        let status = state.resume_agent().await.unwrap();
        assert!(status.agent_running);
    }

    #[tokio::test]
    async fn test_set_quota_validates_and_reloads() {
        let api = MockPoolApi::new(MockPool {
            spaces: vec!["alice".into()],
            ..Default::default()
        });
        let state = state(&api);
        state.load_connection_state().await.unwrap();

        let err = state.set_quota("alice", &QuotaLimits::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::Validation(_)));

        let limits = QuotaLimits {
            cpu: Some("4".into()),
            memory: Some("8Gi".into()),
            ..Default::default()
        };
        state.set_quota("alice", &limits).await.unwrap();
        let updates = api.with_pool(|p| p.quota_updates.clone());
        assert_eq!(updates[0].0, "alice");
        assert_eq!(updates[0].1.get("limits.memory").map(String::as_str), Some("8Gi"));
        assert_eq!(api.count("get_user_space_quota"), 2);
    }

    #[tokio::test]
    async fn test_authorize() {
        let api = MockPoolApi::default();
        let open = state(&api);
        assert!(open.authorize("anything").await);

        let locked = AppState::new(
            Arc::new(api),
            UiConfig::default(),
            PreferenceStore::in_memory(Preferences {
                access_key: Some("s3cret".into()),
                ..Default::default()
            }),
        );
        assert!(!locked.authorize("guess").await);
        assert_eq!(locked.auth().await.error.as_deref(), Some("Invalid user key"));
        assert!(locked.authorize("s3cret").await);

        locked.sign_out().await;
        assert!(!locked.auth().await.logged_in);
    }
}

//! Job listing, selection and deletion

use pooldash_core::{JobRecord, PoolResult};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bulk::{run_sequential, BulkOutcome};
use crate::namespace::NamespaceScope;
use crate::notice::Notice;
use crate::panel::{LoadOutcome, Panel};
use crate::session::AppState;

/// One page of the job listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPage {
    pub jobs: Vec<JobRecord>,
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub total_jobs: usize,
}

#[derive(Debug, Default)]
struct Listing {
    page: usize,
    selected: BTreeSet<String>,
    /// Scope of the most recent load, to detect filter changes
    scope: Option<NamespaceScope>,
}

/// Job list scoped by the session namespace filter
pub struct JobBoard {
    state: Arc<AppState>,
    panel: RwLock<Panel<Vec<JobRecord>>>,
    listing: RwLock<Listing>,
}

impl JobBoard {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            panel: RwLock::new(Panel::new("jobs")),
            listing: RwLock::new(Listing {
                page: 1,
                ..Default::default()
            }),
        }
    }

    /// Fetch the job list for the current namespace filter.
    ///
    /// Nothing is fetched while the filter is uninitialized.
    pub async fn load(&self) -> PoolResult<LoadOutcome> {
        let scope = self.state.namespace().current();
        let Some(namespace) = scope.fetch_scope() else {
            debug!("Namespace filter pending, not loading jobs");
            return Ok(LoadOutcome::Skipped);
        };

        {
            let mut listing = self.listing.write().await;
            if listing.scope.as_ref() != Some(&scope) {
                listing.page = 1;
                listing.scope = Some(scope.clone());
            }
        }

        let ticket = self.panel.write().await.begin();
        let result = self.state.api().fetch_job_details(namespace).await;
        if let Ok(jobs) = &result {
            debug!(
                namespace = %scope,
                jobs = jobs.len(),
                generation = ticket.generation(),
                "Jobs fetched"
            );
        }
        self.panel.write().await.complete(ticket, result)
    }

    /// Change the namespace filter and reload
    pub async fn set_namespace(&self, namespace: Option<String>) -> PoolResult<LoadOutcome> {
        self.state.select_namespace(namespace);
        self.load().await
    }

    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.panel.read().await.data().cloned().unwrap_or_default()
    }

    pub async fn error(&self) -> Option<String> {
        self.panel.read().await.error().map(str::to_string)
    }

    pub async fn is_loading(&self) -> bool {
        self.panel.read().await.is_loading()
    }

    /// Current page of the listing
    pub async fn page(&self) -> JobPage {
        let jobs = self.jobs().await;
        let page_size = self.state.ui().page_size.max(1);
        let total_pages = jobs.len().div_ceil(page_size).max(1);
        let page = self.listing.read().await.page.clamp(1, total_pages);

        JobPage {
            total_jobs: jobs.len(),
            jobs: jobs
                .into_iter()
                .skip((page - 1) * page_size)
                .take(page_size)
                .collect(),
            page,
            total_pages,
        }
    }

    pub async fn set_page(&self, page: usize) {
        self.listing.write().await.page = page.max(1);
    }

    /// Toggle one job in the selection; returns whether it is now selected
    pub async fn toggle_select(&self, job_id: &str) -> bool {
        let mut listing = self.listing.write().await;
        if listing.selected.remove(job_id) {
            false
        } else {
            listing.selected.insert(job_id.to_string());
            true
        }
    }

    /// Select every loaded job, or clear the selection if all are selected
    pub async fn toggle_select_all(&self) {
        let ids: BTreeSet<String> = self.jobs().await.into_iter().map(|j| j.job_id).collect();
        let mut listing = self.listing.write().await;
        if !ids.is_empty() && listing.selected == ids {
            listing.selected.clear();
        } else {
            listing.selected = ids;
        }
    }

    pub async fn selected(&self) -> BTreeSet<String> {
        self.listing.read().await.selected.clone()
    }

    pub async fn find(&self, name: &str) -> Option<JobRecord> {
        self.jobs().await.into_iter().find(|j| j.name == name)
    }

    /// Delete one job in its owning namespace, then reload
    pub async fn delete_job(&self, job: &JobRecord) -> PoolResult<()> {
        self.state
            .api()
            .delete_job(&job.name, owner_namespace(job))
            .await?;
        info!(job = %job.name, owner = %job.owner, "Job deleted");
        self.reload().await;
        Ok(())
    }

    /// Delete every selected job one by one.
    ///
    /// The selection is cleared and the list reloaded whatever the outcome.
    pub async fn bulk_delete(&self) -> BulkOutcome {
        let selected = std::mem::take(&mut self.listing.write().await.selected);
        let targets: Vec<JobRecord> = self
            .jobs()
            .await
            .into_iter()
            .filter(|j| selected.contains(&j.job_id))
            .collect();

        let api = self.state.api();
        let outcome = run_sequential(
            targets,
            |job| job.name.clone(),
            |job| async move { api.delete_job(&job.name, owner_namespace(&job)).await },
        )
        .await;

        self.reload().await;
        outcome
    }

    async fn reload(&self) {
        if let Err(e) = self.load().await {
            warn!(error = %e, "Job list reload failed");
        }
    }
}

fn owner_namespace(job: &JobRecord) -> Option<&str> {
    Some(job.owner.as_str()).filter(|o| !o.is_empty())
}

/// Message for a finished bulk deletion
pub fn bulk_delete_notice(outcome: &BulkOutcome) -> Notice {
    if outcome.is_success() {
        Notice::Success(format!("Deleted {} job(s)", outcome.attempted))
    } else {
        Notice::Error(format!("Some deletions failed: {}", outcome.failure_list()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{PreferenceStore, Preferences};
    use pooldash_client::{MockFailure, MockPool, MockPoolApi};
    use pooldash_core::UiConfig;
    use serde_json::json;
    use std::time::Duration;

    fn job(id: &str, name: &str, owner: &str) -> JobRecord {
        serde_json::from_value(json!({
            "job_id": id,
            "name": name,
            "owner": owner,
            "status": "Running"
        }))
        .unwrap()
    }

    fn board(api: &MockPoolApi, page_size: usize) -> JobBoard {
        let state = AppState::new(
            Arc::new(api.clone()),
            UiConfig {
                page_size,
                ..Default::default()
            },
            PreferenceStore::in_memory(Preferences::default()),
        );
        JobBoard::new(Arc::new(state))
    }

    fn pool() -> MockPoolApi {
        MockPoolApi::new(MockPool {
            jobs: vec![
                job("1", "train-a", "alice"),
                job("2", "train-b", "alice"),
                job("3", "serve-c", "bob"),
            ],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_no_fetch_while_uninitialized() {
        let api = pool();
        let board = board(&api, 10);

        assert_eq!(board.load().await.unwrap(), LoadOutcome::Skipped);
        assert_eq!(api.count("fetch_job_details"), 0);
        assert!(board.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_scoped_to_namespace() {
        let api = pool();
        let board = board(&api, 10);

        board.set_namespace(Some("alice".into())).await.unwrap();
        assert_eq!(board.jobs().await.len(), 2);
        assert_eq!(api.calls(), vec!["fetch_job_details:alice"]);

        board.set_namespace(None).await.unwrap();
        assert_eq!(board.jobs().await.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_load_does_not_overwrite_newer() {
        let api = pool();
        api.set_latency("fetch_job_details:*", Duration::from_millis(50));
        let board = board(&api, 10);
        board.state.select_namespace(None);

        let (slow, fast) = tokio::join!(board.load(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(board.is_loading().await);
            board.set_namespace(Some("bob".into())).await
        });

        assert!(!board.is_loading().await);
        assert_eq!(fast.unwrap(), LoadOutcome::Applied);
        assert_eq!(slow.unwrap(), LoadOutcome::Stale);
        let jobs = board.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].owner, "bob");
    }

    #[tokio::test]
    async fn test_read_error_keeps_jobs() {
        let api = pool();
        let board = board(&api, 10);
        board.set_namespace(None).await.unwrap();

        api.fail("fetch_job_details", MockFailure::Backend("cluster unreachable".into()));
        assert!(board.load().await.is_err());
        assert_eq!(board.jobs().await.len(), 3);
        assert_eq!(board.error().await.as_deref(), Some("cluster unreachable"));
    }

    #[tokio::test]
    async fn test_pagination_resets_on_namespace_change() {
        let api = pool();
        let board = board(&api, 2);
        board.set_namespace(None).await.unwrap();

        let page = board.page().await;
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.jobs.len(), 2);

        board.set_page(2).await;
        let page = board.page().await;
        assert_eq!(page.page, 2);
        assert_eq!(page.jobs[0].name, "serve-c");

        board.set_namespace(Some("alice".into())).await.unwrap();
        assert_eq!(board.page().await.page, 1);
    }

    #[tokio::test]
    async fn test_select_all_toggles() {
        let api = pool();
        let board = board(&api, 10);
        board.set_namespace(None).await.unwrap();

        assert!(board.toggle_select("2").await);
        board.toggle_select_all().await;
        assert_eq!(board.selected().await.len(), 3);
        board.toggle_select_all().await;
        assert!(board.selected().await.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_each_failure() {
        let api = pool();
        api.fail("delete_job:train-b", MockFailure::Backend("job is locked".into()));
        let board = board(&api, 10);
        board.set_namespace(None).await.unwrap();

        board.toggle_select_all().await;
        let outcome = board.bulk_delete().await;

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            bulk_delete_notice(&outcome),
            Notice::Error("Some deletions failed: train-b: job is locked".into())
        );
        assert!(board.selected().await.is_empty());
        // Re-fetched after the run
        assert_eq!(api.count("fetch_job_details"), 2);
        assert_eq!(board.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_single_delete_uses_owner_and_reloads() {
        let api = pool();
        let board = board(&api, 10);
        board.set_namespace(None).await.unwrap();

        let target = board.find("serve-c").await.unwrap();
        board.delete_job(&target).await.unwrap();
        assert!(board.find("serve-c").await.is_none());
        assert_eq!(
            bulk_delete_notice(&BulkOutcome {
                attempted: 2,
                failures: vec![]
            }),
            Notice::Success("Deleted 2 job(s)".into())
        );
    }
}

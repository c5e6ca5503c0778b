//! Dashboard overview: pool capacity gauges and job count

use futures::try_join;
use pooldash_core::{DashboardSummary, PoolResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::panel::{LoadOutcome, Panel};
use crate::session::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DashboardOverview {
    pub summary: DashboardSummary,
    /// Jobs in the operator's namespace
    pub job_count: usize,
}

pub struct Overview {
    state: Arc<AppState>,
    panel: RwLock<Panel<DashboardOverview>>,
}

impl Overview {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            panel: RwLock::new(Panel::new("overview")),
        }
    }

    pub async fn load(&self) -> PoolResult<LoadOutcome> {
        let ticket = self.panel.write().await.begin();
        let namespace = self.state.connection().await.selected_user_space;
        let api = self.state.api();
        let result = try_join!(
            api.fetch_resources(None),
            api.fetch_job_details(namespace.as_deref())
        )
        .map(|(resources, jobs)| DashboardOverview {
            summary: DashboardSummary::from_snapshot(&resources),
            job_count: jobs.len(),
        });
        self.panel.write().await.complete(ticket, result)
    }

    pub async fn overview(&self) -> Option<DashboardOverview> {
        self.panel.read().await.data().copied()
    }

    pub async fn error(&self) -> Option<String> {
        self.panel.read().await.error().map(str::to_string)
    }
}

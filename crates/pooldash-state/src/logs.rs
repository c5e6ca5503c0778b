//! On-demand log polling for jobs and pool services

use pooldash_core::{JobRecord, LogView, PoolResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::panel::{LoadOutcome, Panel};
use crate::session::AppState;

/// Whose logs to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Job {
        /// Sent as the job name; the backend resolves pods by job id
        job_id: String,
        namespace: Option<String>,
        pod: Option<String>,
    },
    Services,
}

impl LogTarget {
    pub fn for_job(job: &JobRecord) -> Self {
        LogTarget::Job {
            job_id: job.job_id.clone(),
            namespace: Some(job.owner.clone()).filter(|o| !o.is_empty()),
            pod: None,
        }
    }
}

#[derive(Debug, Clone)]
struct LogRequest {
    target: Option<LogTarget>,
    tail: u32,
}

pub struct LogPoller {
    state: Arc<AppState>,
    request: RwLock<LogRequest>,
    panel: RwLock<Panel<LogView>>,
}

impl LogPoller {
    pub fn new(state: Arc<AppState>) -> Self {
        let tail = state.ui().log_tail;
        Self {
            state,
            request: RwLock::new(LogRequest { target: None, tail }),
            panel: RwLock::new(Panel::new("logs")),
        }
    }

    /// Point the poller at `target` and fetch
    pub async fn open(&self, target: LogTarget, tail: u32) -> PoolResult<LoadOutcome> {
        {
            let mut request = self.request.write().await;
            request.target = Some(target);
            request.tail = tail;
        }
        self.refresh().await
    }

    /// Re-issue the fetch with the current tail
    pub async fn refresh(&self) -> PoolResult<LoadOutcome> {
        let request = self.request.read().await.clone();
        let Some(target) = request.target else {
            return Ok(LoadOutcome::Skipped);
        };

        let ticket = self.panel.write().await.begin();
        let api = self.state.api();
        let result = match &target {
            LogTarget::Job {
                job_id,
                namespace,
                pod,
            } => {
                api.fetch_job_logs(job_id, namespace.as_deref(), pod.as_deref(), request.tail)
                    .await
            }
            LogTarget::Services => api.fetch_service_logs(request.tail).await,
        };

        // A failed fetch replaces the content rather than keeping stale logs
        let view = result.unwrap_or_else(|e| {
            warn!(source = ?target, error = %e, "Log fetch failed");
            LogView::Error(e.user_message())
        });
        debug!(source = ?target, tail = request.tail, "Logs fetched");
        self.panel.write().await.complete(ticket, Ok(view))
    }

    pub async fn set_tail(&self, tail: u32) {
        self.request.write().await.tail = tail;
    }

    pub async fn tail(&self) -> u32 {
        self.request.read().await.tail
    }

    /// Stop rendering; a fetch still in flight is ignored when it lands
    pub async fn close(&self) {
        self.request.write().await.target = None;
        self.panel.write().await.reset();
    }

    pub async fn view(&self) -> LogView {
        self.panel
            .read()
            .await
            .data()
            .cloned()
            .unwrap_or(LogView::Idle)
    }

    pub async fn is_loading(&self) -> bool {
        self.panel.read().await.is_loading()
    }
}

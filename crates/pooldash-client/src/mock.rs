//! In-memory implementation of [`PoolApi`] for tests and demos
//!
//! Writes mutate the in-memory pool so that a follow-up read reflects them,
//! the way the real backend does. Individual calls can be made to fail or to
//! respond slowly.

use async_trait::async_trait;
use pooldash_core::{
    ComputeUsage, CustomDeployRequest, DeployRequest, Device, GpuNode, JobRecord, LogView,
    MetricsQuery, NodeLabels, PoolError, PoolResult, Quota, ResourceSnapshot, Service,
    TemplateDefinition, TemplateSummary, UsageQuery, UsageSeries,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::api::PoolApi;

/// How a programmed call fails
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// `error` field in the response
    Backend(String),
    /// Connection-level failure
    Transport(String),
}

/// Contents of the simulated pool
#[derive(Debug, Clone, Default)]
pub struct MockPool {
    pub devices: Vec<Device>,
    pub gpus: Vec<GpuNode>,
    pub resources: ResourceSnapshot,
    /// Per-node resources for scoped resource reads
    pub node_resources: HashMap<String, ResourceSnapshot>,
    pub jobs: Vec<JobRecord>,
    pub templates: Vec<TemplateSummary>,
    pub definitions: HashMap<String, TemplateDefinition>,
    pub services: Vec<Service>,
    pub labels: NodeLabels,
    pub spaces: Vec<String>,
    pub quotas: HashMap<String, Quota>,
    pub usage: ComputeUsage,
    pub series: UsageSeries,
    /// Raw job log payloads by job name
    pub job_logs: HashMap<String, Value>,
    pub service_logs: Value,
    pub connected: bool,
    pub agent_running: bool,
    pub is_server: bool,
    /// Accepted deployments
    pub deployed: Vec<DeployRequest>,
    pub custom_deployed: Vec<CustomDeployRequest>,
    /// Quota maps written per namespace
    pub quota_updates: Vec<(String, BTreeMap<String, String>)>,
    pub repositories_updated: u32,
}

#[derive(Debug, Default)]
struct MockInner {
    pool: Mutex<MockPool>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, MockFailure>>,
    latency: Mutex<HashMap<String, Duration>>,
}

/// Mock management API
#[derive(Debug, Clone, Default)]
pub struct MockPoolApi {
    inner: Arc<MockInner>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockPoolApi {
    pub fn new(pool: MockPool) -> Self {
        Self {
            inner: Arc::new(MockInner {
                pool: Mutex::new(pool),
                ..Default::default()
            }),
        }
    }

    /// Inspect or modify the simulated pool
    pub fn with_pool<R>(&self, f: impl FnOnce(&mut MockPool) -> R) -> R {
        f(&mut guard(&self.inner.pool))
    }

    /// Make a call fail. `key` is either the call name (`delete_job`) or the
    /// call name and its argument (`delete_job:train-1`).
    pub fn fail(&self, key: &str, failure: MockFailure) {
        guard(&self.inner.failures).insert(key.to_string(), failure);
    }

    pub fn clear_failure(&self, key: &str) {
        guard(&self.inner.failures).remove(key);
    }

    /// Delay a call, keyed like [`MockPoolApi::fail`]
    pub fn set_latency(&self, key: &str, delay: Duration) {
        guard(&self.inner.latency).insert(key.to_string(), delay);
    }

    /// Every call made so far, as `name:arg`
    pub fn calls(&self) -> Vec<String> {
        guard(&self.inner.calls).clone()
    }

    /// Number of calls to `name`
    pub fn count(&self, name: &str) -> usize {
        let prefix = format!("{}:", name);
        guard(&self.inner.calls)
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    async fn enter(&self, name: &str, arg: &str) -> PoolResult<()> {
        let key = format!("{}:{}", name, arg);
        debug!(call = %key, "Mock API call");
        guard(&self.inner.calls).push(key.clone());

        let delay = {
            let latency = guard(&self.inner.latency);
            latency.get(&key).or_else(|| latency.get(name)).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let failures = guard(&self.inner.failures);
            failures.get(&key).or_else(|| failures.get(name)).cloned()
        };
        match failure {
            Some(MockFailure::Backend(msg)) => Err(PoolError::Backend(msg)),
            Some(MockFailure::Transport(msg)) => Err(PoolError::Transport(msg)),
            None => Ok(()),
        }
    }

    fn set_cordon(&self, nodes: &[String], cordoned: bool) {
        self.with_pool(|pool| {
            for device in pool.devices.iter_mut().filter(|d| nodes.contains(&d.name)) {
                device.unschedulable = cordoned;
            }
        });
    }
}

#[async_trait]
impl PoolApi for MockPoolApi {
    async fn fetch_devices(&self) -> PoolResult<Vec<Device>> {
        self.enter("fetch_devices", "").await?;
        Ok(self.with_pool(|p| p.devices.clone()))
    }

    async fn fetch_gpus(&self, available_only: bool) -> PoolResult<Vec<GpuNode>> {
        self.enter("fetch_gpus", &available_only.to_string()).await?;
        Ok(self.with_pool(|p| {
            p.gpus
                .iter()
                .filter(|g| !available_only || g.available > 0.0)
                .cloned()
                .collect()
        }))
    }

    async fn fetch_resources(&self, nodes: Option<&[String]>) -> PoolResult<ResourceSnapshot> {
        let arg = nodes.map(|n| n.join(",")).unwrap_or_default();
        self.enter("fetch_resources", &arg).await?;
        Ok(self.with_pool(|p| match nodes {
            Some([single]) => p.node_resources.get(single).cloned().unwrap_or_default(),
            _ => p.resources.clone(),
        }))
    }

    async fn fetch_job_details(&self, namespace: Option<&str>) -> PoolResult<Vec<JobRecord>> {
        self.enter("fetch_job_details", namespace.unwrap_or("*")).await?;
        Ok(self.with_pool(|p| {
            p.jobs
                .iter()
                .filter(|j| namespace.map_or(true, |ns| j.owner == ns))
                .cloned()
                .collect()
        }))
    }

    async fn fetch_job_names(&self) -> PoolResult<Vec<String>> {
        self.enter("fetch_job_names", "").await?;
        Ok(self.with_pool(|p| p.jobs.iter().map(|j| j.name.clone()).collect()))
    }

    async fn fetch_job_templates(&self) -> PoolResult<Vec<TemplateSummary>> {
        self.enter("fetch_job_templates", "").await?;
        Ok(self.with_pool(|p| p.templates.clone()))
    }

    async fn fetch_template_all(&self, name: &str) -> PoolResult<TemplateDefinition> {
        self.enter("fetch_template_all", name).await?;
        self.with_pool(|p| p.definitions.get(name).cloned())
            .ok_or_else(|| PoolError::Backend(format!("Template {} not found", name)))
    }

    async fn fetch_pool_services(&self) -> PoolResult<Vec<Service>> {
        self.enter("fetch_pool_services", "").await?;
        Ok(self.with_pool(|p| p.services.clone()))
    }

    async fn get_node_labels(&self, nodes: &[String]) -> PoolResult<NodeLabels> {
        self.enter("get_node_labels", &nodes.join(",")).await?;
        Ok(self.with_pool(|p| {
            p.labels
                .iter()
                .filter(|(node, _)| nodes.contains(node))
                .map(|(node, labels)| (node.clone(), labels.clone()))
                .collect()
        }))
    }

    async fn get_available_user_spaces(&self) -> PoolResult<Vec<String>> {
        self.enter("get_available_user_spaces", "").await?;
        Ok(self.with_pool(|p| p.spaces.clone()))
    }

    async fn get_user_space_quota(&self, space: &str) -> PoolResult<Option<Quota>> {
        self.enter("get_user_space_quota", space).await?;
        Ok(self.with_pool(|p| p.quotas.get(space).copied()))
    }

    async fn get_compute_usage(&self, query: &UsageQuery) -> PoolResult<ComputeUsage> {
        self.enter("get_compute_usage", &query.node_names.join(",")).await?;
        Ok(self.with_pool(|p| p.usage))
    }

    async fn fetch_nodes_metrics(&self, query: &MetricsQuery) -> PoolResult<UsageSeries> {
        self.enter("fetch_nodes_metrics", &query.resources.join(",")).await?;
        Ok(self.with_pool(|p| p.series.clone()))
    }

    async fn fetch_service_logs(&self, tail: u32) -> PoolResult<LogView> {
        self.enter("fetch_service_logs", &tail.to_string()).await?;
        Ok(self.with_pool(|p| LogView::from_service_logs(&p.service_logs)))
    }

    async fn fetch_job_logs(
        &self,
        job_name: &str,
        _namespace: Option<&str>,
        _pod_name: Option<&str>,
        tail: u32,
    ) -> PoolResult<LogView> {
        self.enter("fetch_job_logs", &format!("{}@{}", job_name, tail)).await?;
        Ok(self.with_pool(|p| {
            p.job_logs
                .get(job_name)
                .map(LogView::from_job_logs)
                .unwrap_or(LogView::Empty)
        }))
    }

    async fn is_connected(&self) -> PoolResult<bool> {
        self.enter("is_connected", "").await?;
        Ok(self.with_pool(|p| p.connected))
    }

    async fn is_agent_running(&self) -> PoolResult<bool> {
        self.enter("is_agent_running", "").await?;
        Ok(self.with_pool(|p| p.agent_running))
    }

    async fn is_server(&self) -> PoolResult<bool> {
        self.enter("is_server", "").await?;
        Ok(self.with_pool(|p| p.is_server))
    }

    async fn health(&self) -> PoolResult<()> {
        self.enter("health", "").await
    }

    async fn deploy_job(&self, request: &DeployRequest) -> PoolResult<()> {
        self.enter("deploy_job", &request.name).await?;
        self.with_pool(|p| {
            p.deployed.push(request.clone());
            let owner = request.force_namespace.clone().unwrap_or_default();
            if let Ok(job) = serde_json::from_value::<JobRecord>(serde_json::json!({
                "job_id": request.name,
                "name": request.name,
                "owner": owner,
                "status": "Pending",
            })) {
                p.jobs.push(job);
            }
        });
        Ok(())
    }

    async fn deploy_custom_job(&self, request: &CustomDeployRequest) -> PoolResult<()> {
        self.enter("deploy_custom_job", "").await?;
        self.with_pool(|p| p.custom_deployed.push(request.clone()));
        Ok(())
    }

    async fn delete_job(&self, name: &str, namespace: Option<&str>) -> PoolResult<()> {
        self.enter("delete_job", name).await?;
        self.with_pool(|p| {
            p.jobs
                .retain(|j| !(j.name == name && namespace.map_or(true, |ns| j.owner == ns)))
        });
        Ok(())
    }

    async fn delete_nodes(&self, nodes: &[String]) -> PoolResult<()> {
        self.enter("delete_nodes", &nodes.join(",")).await?;
        self.with_pool(|p| {
            p.devices.retain(|d| !nodes.contains(&d.name));
            p.gpus.retain(|g| !nodes.contains(&g.node));
        });
        Ok(())
    }

    async fn cordon_nodes(&self, nodes: &[String]) -> PoolResult<()> {
        self.enter("cordon_nodes", &nodes.join(",")).await?;
        self.set_cordon(nodes, true);
        Ok(())
    }

    async fn uncordon_nodes(&self, nodes: &[String]) -> PoolResult<()> {
        self.enter("uncordon_nodes", &nodes.join(",")).await?;
        self.set_cordon(nodes, false);
        Ok(())
    }

    async fn add_node_labels(
        &self,
        node: &str,
        labels: &BTreeMap<String, String>,
    ) -> PoolResult<()> {
        self.enter("add_node_labels", node).await?;
        self.with_pool(|p| {
            p.labels
                .entry(node.to_string())
                .or_default()
                .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())))
        });
        Ok(())
    }

    async fn set_user_space_quota(
        &self,
        user_id: &str,
        quota: &BTreeMap<String, String>,
    ) -> PoolResult<()> {
        self.enter("set_user_space_quota", user_id).await?;
        self.with_pool(|p| p.quota_updates.push((user_id.to_string(), quota.clone())));
        Ok(())
    }

    async fn pause_agent(&self) -> PoolResult<()> {
        self.enter("pause_agent", "").await?;
        self.with_pool(|p| p.agent_running = false);
        Ok(())
    }

    async fn resume_agent(&self) -> PoolResult<()> {
        self.enter("resume_agent", "").await?;
        self.with_pool(|p| p.agent_running = true);
        Ok(())
    }

    async fn update_repositories(&self) -> PoolResult<()> {
        self.enter("update_repositories", "").await?;
        self.with_pool(|p| p.repositories_updated += 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_programmed_failure_by_argument() {
        let api = MockPoolApi::default();
        api.fail("delete_job:bad", MockFailure::Backend("locked".into()));

        assert!(api.delete_job("good", None).await.is_ok());
        let err = api.delete_job("bad", None).await.unwrap_err();
        assert_eq!(err.user_message(), "locked");
        assert_eq!(api.count("delete_job"), 2);
    }

    #[tokio::test]
    async fn test_writes_are_visible_to_reads() {
        let api = MockPoolApi::new(MockPool {
            devices: vec![Device {
                name: "node-a".into(),
                ready: true,
                ..Default::default()
            }],
            ..Default::default()
        });

        api.cordon_nodes(&["node-a".to_string()]).await.unwrap();
        let devices = api.fetch_devices().await.unwrap();
        assert!(devices[0].unschedulable);
    }
}

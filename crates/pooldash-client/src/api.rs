//! Management API trait definitions

use async_trait::async_trait;
use pooldash_core::{
    ComputeUsage, CustomDeployRequest, DeployRequest, Device, GpuNode, JobRecord, LogView,
    MetricsQuery, NodeLabels, PoolResult, Quota, ResourceSnapshot, Service, TemplateDefinition,
    TemplateSummary, UsageQuery, UsageSeries,
};
use std::collections::BTreeMap;

/// Calls the dashboard makes against the pool's management API.
///
/// Reads return typed snapshots. Writes return once the backend has accepted
/// them; callers re-read the affected collection afterwards.
#[async_trait]
pub trait PoolApi: Send + Sync {
    /// List devices in the pool
    async fn fetch_devices(&self) -> PoolResult<Vec<Device>>;

    /// List GPUs per node, optionally only nodes with free GPUs
    async fn fetch_gpus(&self, available_only: bool) -> PoolResult<Vec<GpuNode>>;

    /// Pool capacity, optionally restricted to a node subset
    async fn fetch_resources(&self, nodes: Option<&[String]>) -> PoolResult<ResourceSnapshot>;

    /// Jobs, optionally restricted to one namespace
    async fn fetch_job_details(&self, namespace: Option<&str>) -> PoolResult<Vec<JobRecord>>;

    async fn fetch_job_names(&self) -> PoolResult<Vec<String>>;

    /// Template catalogue
    async fn fetch_job_templates(&self) -> PoolResult<Vec<TemplateSummary>>;

    /// Values, schema and metadata of one template
    async fn fetch_template_all(&self, name: &str) -> PoolResult<TemplateDefinition>;

    async fn fetch_pool_services(&self) -> PoolResult<Vec<Service>>;

    /// Labels of the given nodes
    async fn get_node_labels(&self, nodes: &[String]) -> PoolResult<NodeLabels>;

    /// Namespaces the operator can see
    async fn get_available_user_spaces(&self) -> PoolResult<Vec<String>>;

    /// Quota of a namespace; `None` when it has none
    async fn get_user_space_quota(&self, space: &str) -> PoolResult<Option<Quota>>;

    /// Cumulative usage over a window
    async fn get_compute_usage(&self, query: &UsageQuery) -> PoolResult<ComputeUsage>;

    /// Usage time series over a window
    async fn fetch_nodes_metrics(&self, query: &MetricsQuery) -> PoolResult<UsageSeries>;

    /// Tail of the pool service logs
    async fn fetch_service_logs(&self, tail: u32) -> PoolResult<LogView>;

    /// Tail of a job's pod logs
    async fn fetch_job_logs(
        &self,
        job_name: &str,
        namespace: Option<&str>,
        pod_name: Option<&str>,
        tail: u32,
    ) -> PoolResult<LogView>;

    async fn is_connected(&self) -> PoolResult<bool>;

    async fn is_agent_running(&self) -> PoolResult<bool>;

    async fn is_server(&self) -> PoolResult<bool>;

    async fn health(&self) -> PoolResult<()>;

    /// Deploy a catalogue template as a job
    async fn deploy_job(&self, request: &DeployRequest) -> PoolResult<()>;

    /// Deploy an ad-hoc template
    async fn deploy_custom_job(&self, request: &CustomDeployRequest) -> PoolResult<()>;

    /// Delete a job by name in its owning namespace
    async fn delete_job(&self, name: &str, namespace: Option<&str>) -> PoolResult<()>;

    async fn delete_nodes(&self, nodes: &[String]) -> PoolResult<()>;

    async fn cordon_nodes(&self, nodes: &[String]) -> PoolResult<()>;

    async fn uncordon_nodes(&self, nodes: &[String]) -> PoolResult<()>;

    async fn add_node_labels(
        &self,
        node: &str,
        labels: &BTreeMap<String, String>,
    ) -> PoolResult<()>;

    async fn set_user_space_quota(
        &self,
        user_id: &str,
        quota: &BTreeMap<String, String>,
    ) -> PoolResult<()>;

    async fn pause_agent(&self) -> PoolResult<()>;

    async fn resume_agent(&self) -> PoolResult<()>;

    /// Refresh the template repositories
    async fn update_repositories(&self) -> PoolResult<()>;
}

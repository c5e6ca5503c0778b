//! reqwest-backed management API client

use async_trait::async_trait;
use pooldash_core::{
    ApiConfig, ComputeUsage, CustomDeployRequest, DeployRequest, Device, GpuNode, JobRecord,
    LogView, MetricsQuery, NodeLabels, PoolError, PoolResult, Quota, ResourceSnapshot, Service,
    TemplateDefinition, TemplateSummary, UsageQuery, UsageSeries,
};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::PoolApi;
use crate::response::{ack, check, decode, decode_list};

/// Header carrying the access key
pub const API_KEY_HEADER: &str = "X-API-Key";

const NO_QUERY: &[(&str, &str)] = &[];

/// API client for communicating with the management API
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a client from configuration
    pub fn new(config: &ApiConfig) -> PoolResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| PoolError::Config(format!("Invalid API key: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| PoolError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<Q>(&self, endpoint: &str, query: &Q) -> PoolResult<Value>
    where
        Q: Serialize + Sync + ?Sized,
    {
        let request = self.client.get(self.url(endpoint)).query(query);
        self.send(endpoint, request).await
    }

    async fn post<B>(&self, endpoint: &str, body: &B) -> PoolResult<Value>
    where
        B: Serialize + Sync + ?Sized,
    {
        let request = self.client.post(self.url(endpoint)).json(body);
        self.send(endpoint, request).await
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> PoolResult<Value> {
        debug!(endpoint = endpoint, "Calling management API");

        let response = request.send().await.map_err(|e| {
            warn!(endpoint = endpoint, error = %e, "Request failed");
            PoolError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PoolError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(endpoint = endpoint, status = %status, "Management API returned an error status");
            // FastAPI-style errors carry a `detail` field
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| match v.get("detail")? {
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .unwrap_or(body);
            return Err(PoolError::Transport(format!("HTTP {}: {}", status, detail)));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Serialize)]
struct NodesBody<'a> {
    nodes: &'a [String],
}

#[derive(Deserialize, Default)]
struct LabelsResponse {
    #[serde(default)]
    labels: NodeLabels,
}

#[async_trait]
impl PoolApi for ApiClient {
    async fn fetch_devices(&self) -> PoolResult<Vec<Device>> {
        decode_list(self.get("fetch_devices", NO_QUERY).await?)
    }

    async fn fetch_gpus(&self, available_only: bool) -> PoolResult<Vec<GpuNode>> {
        decode_list(self.get("fetch_gpus", &[("available", available_only)]).await?)
    }

    async fn fetch_resources(&self, nodes: Option<&[String]>) -> PoolResult<ResourceSnapshot> {
        let mut request = self.client.get(self.url("fetch_resources"));
        if let Some(nodes) = nodes {
            request = request.json(&NodesBody { nodes });
        }
        let value = check(self.send("fetch_resources", request).await?)?;
        if value.is_null() {
            return Ok(ResourceSnapshot::default());
        }
        decode(value)
    }

    async fn fetch_job_details(&self, namespace: Option<&str>) -> PoolResult<Vec<JobRecord>> {
        let query: Vec<(&str, &str)> = namespace
            .map(|ns| ("force_namespace", ns))
            .into_iter()
            .collect();
        decode_list(self.get("fetch_job_details", &query).await?)
    }

    async fn fetch_job_names(&self) -> PoolResult<Vec<String>> {
        decode_list(self.get("fetch_job_names", NO_QUERY).await?)
    }

    async fn fetch_job_templates(&self) -> PoolResult<Vec<TemplateSummary>> {
        decode_list(self.get("fetch_job_templates", NO_QUERY).await?)
    }

    async fn fetch_template_all(&self, name: &str) -> PoolResult<TemplateDefinition> {
        decode(self.get("fetch_template_all", &[("name", name)]).await?)
    }

    async fn fetch_pool_services(&self) -> PoolResult<Vec<Service>> {
        let value = check(self.get("fetch_pool_services", NO_QUERY).await?)?;
        Service::from_pool_services(value)
    }

    async fn get_node_labels(&self, nodes: &[String]) -> PoolResult<NodeLabels> {
        let query: Vec<(&str, &str)> = nodes.iter().map(|n| ("nodes", n.as_str())).collect();
        let value = check(self.get("get_node_labels", &query).await?)?;
        if value.is_null() {
            return Ok(NodeLabels::new());
        }
        let response: LabelsResponse = serde_json::from_value(value)?;
        Ok(response.labels)
    }

    async fn get_available_user_spaces(&self) -> PoolResult<Vec<String>> {
        decode_list(self.get("get_available_user_spaces", NO_QUERY).await?)
    }

    async fn get_user_space_quota(&self, space: &str) -> PoolResult<Option<Quota>> {
        let value = check(self.get("get_user_space_quota", &[("space_name", space)]).await?)?;
        Ok(Quota::from_response(&value))
    }

    async fn get_compute_usage(&self, query: &UsageQuery) -> PoolResult<ComputeUsage> {
        let value = check(self.post("get_compute_usage", query).await?)?;
        if value.is_null() {
            return Ok(ComputeUsage::default());
        }
        decode(value)
    }

    async fn fetch_nodes_metrics(&self, query: &MetricsQuery) -> PoolResult<UsageSeries> {
        let value = check(self.post("fetch_nodes_metrics", query).await?)?;
        if value.is_null() {
            return Ok(UsageSeries::default());
        }
        decode(value)
    }

    async fn fetch_service_logs(&self, tail: u32) -> PoolResult<LogView> {
        let value = self.get("fetch_service_logs", &[("tail", tail)]).await?;
        Ok(LogView::from_service_logs(&value))
    }

    async fn fetch_job_logs(
        &self,
        job_name: &str,
        namespace: Option<&str>,
        pod_name: Option<&str>,
        tail: u32,
    ) -> PoolResult<LogView> {
        let tail = tail.to_string();
        let mut query = vec![("job_name", job_name), ("tail", tail.as_str())];
        if let Some(ns) = namespace {
            query.push(("force_namespace", ns));
        }
        if let Some(pod) = pod_name {
            query.push(("pod_name", pod));
        }
        let value = self.get("fetch_job_logs", &query).await?;
        Ok(LogView::from_job_logs(&value))
    }

    async fn is_connected(&self) -> PoolResult<bool> {
        decode(self.get("is_connected", NO_QUERY).await?)
    }

    async fn is_agent_running(&self) -> PoolResult<bool> {
        decode(self.get("is_agent_running", NO_QUERY).await?)
    }

    async fn is_server(&self) -> PoolResult<bool> {
        decode(self.get("is_server", NO_QUERY).await?)
    }

    async fn health(&self) -> PoolResult<()> {
        ack(self.get("health", NO_QUERY).await?)
    }

    async fn deploy_job(&self, request: &DeployRequest) -> PoolResult<()> {
        ack(self.post("deploy_job", request).await?)
    }

    async fn deploy_custom_job(&self, request: &CustomDeployRequest) -> PoolResult<()> {
        ack(self.post("deploy_custom_job", request).await?)
    }

    async fn delete_job(&self, name: &str, namespace: Option<&str>) -> PoolResult<()> {
        ack(self
            .post("delete_job", &json!({"name": name, "force_namespace": namespace}))
            .await?)
    }

    async fn delete_nodes(&self, nodes: &[String]) -> PoolResult<()> {
        ack(self.post("delete_nodes", &NodesBody { nodes }).await?)
    }

    async fn cordon_nodes(&self, nodes: &[String]) -> PoolResult<()> {
        ack(self.post("cordon_nodes", &NodesBody { nodes }).await?)
    }

    async fn uncordon_nodes(&self, nodes: &[String]) -> PoolResult<()> {
        ack(self.post("uncordon_nodes", &NodesBody { nodes }).await?)
    }

    async fn add_node_labels(
        &self,
        node: &str,
        labels: &BTreeMap<String, String>,
    ) -> PoolResult<()> {
        ack(self
            .post("add_node_labels", &json!({"node_name": node, "labels": labels}))
            .await?)
    }

    async fn set_user_space_quota(
        &self,
        user_id: &str,
        quota: &BTreeMap<String, String>,
    ) -> PoolResult<()> {
        ack(self
            .post("set_user_space_quota", &json!({"user_id": user_id, "quota": quota}))
            .await?)
    }

    async fn pause_agent(&self) -> PoolResult<()> {
        ack(self.send("pause_agent", self.client.post(self.url("pause_agent"))).await?)
    }

    async fn resume_agent(&self) -> PoolResult<()> {
        ack(self.send("resume_agent", self.client.post(self.url("resume_agent"))).await?)
    }

    async fn update_repositories(&self) -> PoolResult<()> {
        ack(self
            .send("update_repositories", self.client.post(self.url("update_repositories")))
            .await?)
    }
}

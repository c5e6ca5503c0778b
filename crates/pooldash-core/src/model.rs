//! Device, job, service and template records as served by the management API

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A compute device (node) in the pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    /// Node name
    pub name: String,
    /// Whether the node reports ready
    pub ready: bool,
    /// Whether the node is cordoned
    pub unschedulable: bool,
    pub memory_pressure: bool,
    pub disk_pressure: bool,
    pub pid_pressure: bool,
}

impl Device {
    /// Names of the pressure conditions currently raised on this device
    pub fn issues(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if self.memory_pressure {
            issues.push("memory_pressure");
        }
        if self.disk_pressure {
            issues.push("disk_pressure");
        }
        if self.pid_pressure {
            issues.push("pid_pressure");
        }
        issues
    }
}

/// GPU inventory of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuNode {
    /// Node hosting the GPUs
    pub node: String,
    /// GPU model names
    pub models: Vec<String>,
    /// Number of GPUs on the node
    pub total: f64,
    /// Number of GPUs not allocated
    pub available: f64,
    /// Readiness as reported by the GPU listing
    pub ready: bool,
}

/// Endpoint as it arrives from the backend: either a ready URL or an
/// address/port pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEndpoint {
    Url(String),
    Address { address: String, port: PortValue },
}

/// Ports arrive either as numbers or as strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for PortValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortValue::Number(n) => write!(f, "{}", n),
            PortValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl RawEndpoint {
    /// Resolve to a single URL
    pub fn url(&self) -> String {
        match self {
            RawEndpoint::Url(url) => url.clone(),
            RawEndpoint::Address { address, port } => format!("http://{}:{}", address, port),
        }
    }
}

/// A deployed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawJob")]
pub struct JobRecord {
    /// Unique job identifier
    pub job_id: String,
    /// Job name
    pub name: String,
    /// Owning namespace
    pub owner: String,
    /// Status as reported by the backend
    pub status: String,
    /// Worker summary
    pub workers: String,
    /// Newline-delimited list of hosting nodes
    pub host_nodes: String,
    /// Logical endpoint name to URL
    pub endpoints: BTreeMap<String, String>,
    /// Opaque job spec, for display only
    pub spec: Option<Value>,
    /// Opaque job conditions, for display only
    pub conditions: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(default, deserialize_with = "string_or_number")]
    job_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    owner: String,
    #[serde(default, deserialize_with = "string_or_number")]
    status: String,
    #[serde(default, deserialize_with = "string_or_number")]
    workers: String,
    #[serde(default, deserialize_with = "string_or_number")]
    host_nodes: String,
    #[serde(default, deserialize_with = "null_as_default")]
    endpoint: BTreeMap<String, RawEndpoint>,
    #[serde(default)]
    spec: Option<Value>,
    #[serde(default)]
    conditions: Option<Value>,
}

impl From<RawJob> for JobRecord {
    fn from(raw: RawJob) -> Self {
        Self {
            job_id: raw.job_id,
            name: raw.name,
            owner: raw.owner,
            status: raw.status,
            workers: raw.workers,
            host_nodes: raw.host_nodes,
            endpoints: raw
                .endpoint
                .iter()
                .map(|(name, ep)| (name.clone(), ep.url()))
                .collect(),
            spec: raw.spec.filter(|v| !v.is_null()),
            conditions: raw.conditions.filter(|v| !v.is_null()),
        }
    }
}

impl JobRecord {
    /// Hosting nodes, one per entry
    pub fn host_node_list(&self) -> Vec<&str> {
        self.host_nodes
            .split('\n')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Color tone used to render the status
    pub fn tone(&self) -> StatusTone {
        StatusTone::for_status(&self.status)
    }

    /// Job spec as indented JSON
    pub fn spec_text(&self) -> String {
        pretty_or(self.spec.as_ref(), "Job spec pending...")
    }

    /// Job conditions as indented JSON
    pub fn conditions_text(&self) -> String {
        pretty_or(self.conditions.as_ref(), "Status pending...")
    }
}

fn pretty_or(value: Option<&Value>, pending: &str) -> String {
    match value {
        None | Some(Value::Null) => pending.to_string(),
        Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
    }
}

/// Fixed color mapping for job statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Success,
    Warning,
    Danger,
    Unknown,
}

impl StatusTone {
    pub fn for_status(status: &str) -> Self {
        match status {
            "Running" => StatusTone::Success,
            "Pending" => StatusTone::Warning,
            "Error" => StatusTone::Danger,
            _ => StatusTone::Unknown,
        }
    }
}

impl std::fmt::Display for StatusTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusTone::Success => write!(f, "green"),
            StatusTone::Warning => write!(f, "yellow"),
            StatusTone::Danger => write!(f, "red"),
            StatusTone::Unknown => write!(f, "gray"),
        }
    }
}

/// A core service exposed by the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub namespace: String,
    pub name: String,
    /// Endpoint name to in-cluster address
    pub internal: BTreeMap<String, String>,
    /// Endpoint name to externally reachable URL
    pub external: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(default)]
    name: String,
    #[serde(default)]
    endpoints: BTreeMap<String, RawServiceEndpoint>,
}

#[derive(Debug, Deserialize)]
struct RawServiceEndpoint {
    #[serde(default)]
    internal: String,
    #[serde(default)]
    external: Option<String>,
}

impl Service {
    /// Flatten the `{namespace: [service, ..]}` pool services payload
    pub fn from_pool_services(value: Value) -> Result<Vec<Service>, crate::PoolError> {
        let grouped: BTreeMap<String, Vec<RawService>> = match value {
            Value::Null => BTreeMap::new(),
            other => serde_json::from_value(other)?,
        };

        let mut services = Vec::new();
        for (namespace, entries) in grouped {
            for raw in entries {
                let internal = raw
                    .endpoints
                    .iter()
                    .map(|(name, ep)| (name.clone(), ep.internal.clone()))
                    .collect();
                let external = raw
                    .endpoints
                    .iter()
                    .filter_map(|(name, ep)| match ep.external.as_deref() {
                        Some(ext) if !ext.is_empty() => {
                            Some((name.clone(), format!("http://{}", ext)))
                        }
                        _ => None,
                    })
                    .collect();
                services.push(Service {
                    namespace: namespace.clone(),
                    name: raw.name,
                    internal,
                    external,
                });
            }
        }
        Ok(services)
    }
}

/// Entry of the template catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTemplateSummary")]
pub struct TemplateSummary {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTemplateSummary {
    Name(String),
    Entry {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<RawTemplateSummary> for TemplateSummary {
    fn from(raw: RawTemplateSummary) -> Self {
        match raw {
            RawTemplateSummary::Name(name) => Self {
                name,
                description: None,
            },
            RawTemplateSummary::Entry { name, description } => Self { name, description },
        }
    }
}

/// Full definition of one template: default values, schema and metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateDefinition {
    /// Default parameter values; defines which parameters exist and their order
    #[serde(deserialize_with = "null_as_default")]
    pub values: Map<String, Value>,
    /// Parameter schema
    #[serde(deserialize_with = "null_as_default")]
    pub schema: TemplateSchema,
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: TemplateMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSchema {
    #[serde(deserialize_with = "null_as_default")]
    pub properties: Map<String, Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub sources: Vec<String>,
    pub version: Option<String>,
}

/// How multiple target labels combine when constraining placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LabelMode {
    #[default]
    And,
    Or,
}

impl std::fmt::Display for LabelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelMode::And => write!(f, "AND"),
            LabelMode::Or => write!(f, "OR"),
        }
    }
}

impl std::str::FromStr for LabelMode {
    type Err = crate::PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(LabelMode::And),
            "OR" => Ok(LabelMode::Or),
            other => Err(crate::PoolError::Validation(format!(
                "label mode must be AND or OR, got '{}'",
                other
            ))),
        }
    }
}

/// Request to deploy a catalogue template as a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployRequest {
    pub name: String,
    pub template_name: String,
    pub values: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_labels: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_labels_ops: Option<LabelMode>,
}

/// Request to deploy an ad-hoc template that is not in the catalogue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomDeployRequest {
    pub template_str: String,
    pub values: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_values: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_labels: Option<BTreeMap<String, Vec<String>>>,
}

/// Labels per node name
pub type NodeLabels = BTreeMap<String, BTreeMap<String, String>>;

/// Backend connectivity flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub connected: bool,
    pub agent_running: bool,
    pub is_server: bool,
}

/// Numeric value that may arrive as a JSON number or a numeric string.
/// Anything else reads as zero.
pub fn lenient_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_endpoint_normalization() {
        let job: JobRecord = serde_json::from_value(json!({
            "job_id": "vllm-1",
            "name": "vllm-1",
            "owner": "alice",
            "status": "Running",
            "workers": 2,
            "host_nodes": "node-a\nnode-b\n",
            "endpoint": {
                "api": {"address": "10.0.0.4", "port": "30080"},
                "metrics": {"address": "10.0.0.4", "port": 9100},
                "ui": "https://ui.pool.example"
            }
        }))
        .unwrap();

        assert_eq!(job.endpoints["api"], "http://10.0.0.4:30080");
        assert_eq!(job.endpoints["metrics"], "http://10.0.0.4:9100");
        assert_eq!(job.endpoints["ui"], "https://ui.pool.example");
        assert_eq!(job.workers, "2");
        assert_eq!(job.host_node_list(), vec!["node-a", "node-b"]);
        assert!(job.spec.is_none());
    }

    #[test]
    fn test_job_missing_endpoint() {
        let job: JobRecord =
            serde_json::from_value(json!({"job_id": "x", "name": "x", "endpoint": null})).unwrap();
        assert!(job.endpoints.is_empty());
        assert_eq!(job.tone(), StatusTone::Unknown);
    }

    #[test]
    fn test_job_details_text() {
        let pending: JobRecord = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(pending.spec_text(), "Job spec pending...");
        assert_eq!(pending.conditions_text(), "Status pending...");

        let job: JobRecord = serde_json::from_value(json!({
            "name": "x",
            "spec": {"replicas": 2},
            "conditions": [{"type": "Ready"}]
        }))
        .unwrap();
        assert_eq!(job.spec_text(), "{\n  \"replicas\": 2\n}");
        assert!(job.conditions_text().contains("\"type\": \"Ready\""));
    }

    #[test]
    fn test_status_tone() {
        assert_eq!(StatusTone::for_status("Running"), StatusTone::Success);
        assert_eq!(StatusTone::for_status("Pending"), StatusTone::Warning);
        assert_eq!(StatusTone::for_status("Error"), StatusTone::Danger);
        assert_eq!(StatusTone::for_status("Completed"), StatusTone::Unknown);
        assert_eq!(StatusTone::for_status(""), StatusTone::Unknown);
    }

    #[test]
    fn test_device_issues() {
        let device = Device {
            name: "node-a".to_string(),
            memory_pressure: true,
            pid_pressure: true,
            ..Default::default()
        };
        assert_eq!(device.issues(), vec!["memory_pressure", "pid_pressure"]);
    }

    #[test]
    fn test_pool_services_flatten() {
        let services = Service::from_pool_services(json!({
            "default": [
                {"name": "watcher", "endpoints": {
                    "http": {"internal": "watcher.svc:8080", "external": "1.2.3.4:31000"},
                    "grpc": {"internal": "watcher.svc:9090"}
                }}
            ],
            "alice": []
        }))
        .unwrap();

        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.namespace, "default");
        assert_eq!(svc.internal.len(), 2);
        assert_eq!(svc.external.len(), 1);
        assert_eq!(svc.external["http"], "http://1.2.3.4:31000");
    }

    #[test]
    fn test_template_summary_shapes() {
        let list: Vec<TemplateSummary> =
            serde_json::from_value(json!(["vllm", {"name": "llamacpp", "description": "cpu"}]))
                .unwrap();
        assert_eq!(list[0].name, "vllm");
        assert_eq!(list[1].description.as_deref(), Some("cpu"));
    }

    #[test]
    fn test_deploy_request_omits_unset_fields() {
        let req = DeployRequest {
            name: "job".to_string(),
            template_name: "vllm".to_string(),
            values: Map::new(),
            force_namespace: None,
            target_labels: None,
            target_labels_ops: None,
        };
        let encoded = serde_json::to_value(&req).unwrap();
        assert_eq!(encoded, json!({"name": "job", "template_name": "vllm", "values": {}}));
    }

    #[test]
    fn test_lenient_f64() {
        assert_eq!(lenient_f64(&json!(4)), 4.0);
        assert_eq!(lenient_f64(&json!("2.5")), 2.5);
        assert_eq!(lenient_f64(&json!("8Gi")), 0.0);
        assert_eq!(lenient_f64(&Value::Null), 0.0);
    }
}

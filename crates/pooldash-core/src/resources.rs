//! Resource and usage aggregation
//!
//! The backend reports pool capacity as two flat maps (`total`, `available`)
//! keyed by resource name, GPUs split across vendor keys, memory in bytes and
//! cumulative usage in seconds. Everything here reshapes those payloads into
//! dashboard values. Nothing is rounded here; [`round2`] is applied by the
//! presentation layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::model::{lenient_f64, Device, GpuNode};

/// Resource keys that count as GPUs
pub const GPU_BACKEND_KEYS: [&str; 2] = ["nvidia.com/gpu", "amd.com/gpu"];

/// Resource keys shown in a node's detail view
pub const NODE_DETAIL_KEYS: [&str; 4] = ["cpu", "memory", "nvidia.com/gpu", "amd.com/gpu"];

const BYTES_PER_GB: f64 = 1_000_000_000.0;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Round to two decimal places for display
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Capacity and availability per resource key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(default, deserialize_with = "quantity_map")]
    pub total: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "quantity_map")]
    pub available: BTreeMap<String, f64>,
}

impl ResourceSnapshot {
    /// Total quantity for a key, zero when absent
    pub fn total_of(&self, key: &str) -> f64 {
        self.total.get(key).copied().unwrap_or(0.0)
    }

    /// Available quantity for a key, zero when absent
    pub fn available_of(&self, key: &str) -> f64 {
        self.available.get(key).copied().unwrap_or(0.0)
    }

    /// GPU counts summed over the vendor keys
    pub fn gpu_aggregate(&self) -> GpuAggregate {
        GPU_BACKEND_KEYS
            .iter()
            .fold(GpuAggregate::default(), |acc, key| GpuAggregate {
                total_gpus: acc.total_gpus + self.total_of(key),
                online_gpus: acc.online_gpus + self.available_of(key),
            })
    }

    /// Per-key `(available, total)` restricted to [`NODE_DETAIL_KEYS`] that
    /// appear on either side
    pub fn node_detail(&self) -> BTreeMap<String, (f64, f64)> {
        NODE_DETAIL_KEYS
            .iter()
            .filter(|key| self.total.contains_key(**key) || self.available.contains_key(**key))
            .map(|key| (key.to_string(), (self.available_of(key), self.total_of(key))))
            .collect()
    }
}

/// Map values can be numbers, numeric strings or junk; junk reads as zero.
fn quantity_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .iter()
        .map(|(key, value)| (key.clone(), lenient_f64(value)))
        .collect())
}

/// GPU totals across vendors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GpuAggregate {
    pub total_gpus: f64,
    pub online_gpus: f64,
}

/// One dashboard gauge. `online` is what is currently available, not what
/// is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Gauge {
    pub online: f64,
    pub total: f64,
}

impl Gauge {
    pub fn new(online: f64, total: f64) -> Self {
        Self { online, total }
    }

    /// Percentage of capacity in use, in `[0, 100]`
    pub fn fill_percent(&self) -> f64 {
        if self.total <= 0.0 || !self.total.is_finite() {
            return 0.0;
        }
        let used = (self.total - self.online) / self.total * 100.0;
        if used.is_nan() {
            return 0.0;
        }
        used.clamp(0.0, 100.0)
    }

    /// Amount in use, never negative
    pub fn used(&self) -> f64 {
        (self.total - self.online).max(0.0)
    }
}

/// Pool-wide overview derived from a [`ResourceSnapshot`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_cpus: f64,
    pub online_cpus: f64,
    pub total_gpus: f64,
    pub online_gpus: f64,
    /// Decimal gigabytes
    pub total_ram: f64,
    /// Decimal gigabytes
    pub online_ram: f64,
    pub total_devices: f64,
    pub online_devices: f64,
}

impl DashboardSummary {
    pub fn from_snapshot(snapshot: &ResourceSnapshot) -> Self {
        let gpus = snapshot.gpu_aggregate();
        Self {
            total_cpus: snapshot.total_of("cpu"),
            online_cpus: snapshot.available_of("cpu"),
            total_gpus: gpus.total_gpus,
            online_gpus: gpus.online_gpus,
            total_ram: snapshot.total_of("memory") / BYTES_PER_GB,
            online_ram: snapshot.available_of("memory") / BYTES_PER_GB,
            total_devices: snapshot.total_of("n_nodes"),
            online_devices: snapshot.available_of("n_nodes"),
        }
    }

    pub fn cpu(&self) -> Gauge {
        Gauge::new(self.online_cpus, self.total_cpus)
    }

    pub fn gpu(&self) -> Gauge {
        Gauge::new(self.online_gpus, self.total_gpus)
    }

    pub fn ram(&self) -> Gauge {
        Gauge::new(self.online_ram, self.total_ram)
    }

    pub fn devices(&self) -> Gauge {
        Gauge::new(self.online_devices, self.total_devices)
    }
}

/// Raw usage-over-time series as parallel arrays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSeries {
    pub timestamp: Vec<String>,
    pub total_resources: Vec<Value>,
    pub used_resources: Vec<Value>,
}

/// One point of a usage chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsagePoint {
    pub timestamp: String,
    pub total: f64,
    pub used: f64,
}

impl UsageSeries {
    /// Zip the parallel arrays into points, one per timestamp. Short value
    /// arrays read as zero past their end.
    pub fn points(&self) -> Vec<UsagePoint> {
        let at = |values: &[Value], index: usize| values.get(index).map(lenient_f64).unwrap_or(0.0);
        self.timestamp
            .iter()
            .enumerate()
            .map(|(i, ts)| UsagePoint {
                timestamp: ts.clone(),
                total: at(&self.total_resources, i),
                used: at(&self.used_resources, i),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }
}

/// Cumulative usage as returned by the backend: seconds for CPU and GPU,
/// byte-seconds for memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeUsage {
    pub cpu: f64,
    pub ram: f64,
    pub gpus: f64,
}

/// Cumulative usage in hours
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageHours {
    pub cpu_hours: f64,
    /// GiB-hours
    pub memory_hours: f64,
    pub gpu_hours: f64,
}

impl From<ComputeUsage> for UsageHours {
    fn from(usage: ComputeUsage) -> Self {
        Self {
            cpu_hours: usage.cpu / SECONDS_PER_HOUR,
            memory_hours: usage.ram / (BYTES_PER_GIB * SECONDS_PER_HOUR),
            gpu_hours: usage.gpus / SECONDS_PER_HOUR,
        }
    }
}

/// Monitoring window presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "24h")]
    Last24h,
    #[serde(rename = "3d")]
    Last3d,
    #[serde(rename = "7d")]
    Last7d,
    #[serde(rename = "15d")]
    Last15d,
}

impl TimeRange {
    pub fn duration(&self) -> Duration {
        match self {
            TimeRange::Last24h => Duration::hours(24),
            TimeRange::Last3d => Duration::days(3),
            TimeRange::Last7d => Duration::days(7),
            TimeRange::Last15d => Duration::days(15),
        }
    }

    /// `(start, end)` of the window ending at `now`
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.duration(), now)
    }
}

impl std::str::FromStr for TimeRange {
    type Err = crate::PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(TimeRange::Last24h),
            "3d" => Ok(TimeRange::Last3d),
            "7d" => Ok(TimeRange::Last7d),
            "15d" => Ok(TimeRange::Last15d),
            other => Err(crate::PoolError::Validation(format!(
                "unknown time range '{}', expected 24h, 3d, 7d or 15d",
                other
            ))),
        }
    }
}

/// Which resource family a metrics chart shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricResource {
    #[default]
    Gpus,
    Cpu,
}

impl MetricResource {
    /// Metric names understood by the backend
    pub fn metric_keys(&self) -> Vec<String> {
        match self {
            MetricResource::Gpus => vec!["amd_com_gpu".to_string(), "nvidia_com_gpu".to_string()],
            MetricResource::Cpu => vec!["cpu".to_string()],
        }
    }
}

impl std::str::FromStr for MetricResource {
    type Err = crate::PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpus" | "gpu" => Ok(MetricResource::Gpus),
            "cpu" => Ok(MetricResource::Cpu),
            other => Err(crate::PoolError::Validation(format!(
                "unknown resource '{}', expected gpus or cpu",
                other
            ))),
        }
    }
}

/// Body of a compute usage request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageQuery {
    pub start_time: String,
    pub end_time: String,
    pub node_names: Vec<String>,
}

impl UsageQuery {
    pub fn new(range: TimeRange, now: DateTime<Utc>, node_names: Vec<String>) -> Self {
        let (start, end) = range.window(now);
        Self {
            start_time: start.to_rfc3339(),
            end_time: end.to_rfc3339(),
            node_names,
        }
    }
}

/// Body of a node metrics request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsQuery {
    pub start_time: String,
    pub end_time: String,
    pub node_names: Vec<String>,
    pub resources: Vec<String>,
    pub aggregate_results: bool,
}

impl MetricsQuery {
    pub fn new(
        range: TimeRange,
        now: DateTime<Utc>,
        node_names: Vec<String>,
        resource: MetricResource,
    ) -> Self {
        let (start, end) = range.window(now);
        Self {
            start_time: start.to_rfc3339(),
            end_time: end.to_rfc3339(),
            node_names,
            resources: resource.metric_keys(),
            aggregate_results: true,
        }
    }
}

/// One row of the resource table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRow {
    pub node: String,
    /// GPU models, newline separated, `-` when none
    pub models: String,
    /// GPU utilisation percent
    pub used: f64,
    /// GPUs on the node
    pub total: f64,
    /// Pressure conditions, comma separated
    pub issues: String,
    pub cordoned: bool,
    pub ready: bool,
}

impl ResourceRow {
    fn severity(&self) -> u8 {
        (if self.ready { 0 } else { 2 }) + u8::from(self.cordoned)
    }
}

/// Join the device list and GPU list into one row per node, not-ready
/// nodes first, then cordoned ones.
pub fn combine_nodes(devices: &[Device], gpus: &[GpuNode]) -> Vec<ResourceRow> {
    let by_name: HashMap<&str, &Device> = devices.iter().map(|d| (d.name.as_str(), d)).collect();
    let mut seen = std::collections::HashSet::new();
    let mut rows = Vec::with_capacity(devices.len().max(gpus.len()));

    for gpu in gpus {
        seen.insert(gpu.node.as_str());
        let device = by_name.get(gpu.node.as_str());
        let used = if gpu.total > 0.0 {
            100.0 - (gpu.available / gpu.total * 100.0).round()
        } else {
            0.0
        };
        let models = gpu.models.join("\n");
        rows.push(ResourceRow {
            node: gpu.node.clone(),
            models: if models.is_empty() { "-".to_string() } else { models },
            used,
            total: gpu.total,
            issues: device.map(|d| d.issues().join(", ")).unwrap_or_default(),
            cordoned: device.map(|d| d.unschedulable).unwrap_or(false),
            ready: device.map(|d| d.ready).unwrap_or(gpu.ready),
        });
    }

    for device in devices {
        if seen.contains(device.name.as_str()) {
            continue;
        }
        rows.push(ResourceRow {
            node: device.name.clone(),
            models: "-".to_string(),
            used: 0.0,
            total: 0.0,
            issues: device.issues().join(", "),
            cordoned: device.unschedulable,
            ready: device.ready,
        });
    }

    rows.sort_by(|a, b| b.severity().cmp(&a.severity()));
    rows
}

//! Usage monitoring over a time window and a device subset

use chrono::Utc;
use pooldash_core::{
    MetricResource, MetricsQuery, PoolResult, TimeRange, UsageHours, UsageQuery, UsageSeries,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::panel::{LoadOutcome, Panel};
use crate::session::AppState;

/// Filters the monitoring panels are loaded with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorFilters {
    /// Device names; defaults to every device
    pub devices: Vec<String>,
    pub range: TimeRange,
    pub resource: MetricResource,
}

pub struct Monitor {
    state: Arc<AppState>,
    devices: RwLock<Panel<Vec<String>>>,
    filters: RwLock<MonitorFilters>,
    usage: RwLock<Panel<UsageHours>>,
    series: RwLock<Panel<UsageSeries>>,
}

impl Monitor {
    pub fn new(state: Arc<AppState>) -> Self {
        let range = state.ui().time_range;
        Self {
            state,
            devices: RwLock::new(Panel::new("monitor-devices")),
            filters: RwLock::new(MonitorFilters {
                devices: Vec::new(),
                range,
                resource: MetricResource::default(),
            }),
            usage: RwLock::new(Panel::new("usage")),
            series: RwLock::new(Panel::new("usage-series")),
        }
    }

    /// Load the device list and select all of it
    pub async fn load_devices(&self) -> PoolResult<LoadOutcome> {
        let ticket = self.devices.write().await.begin();
        let result = self
            .state
            .api()
            .fetch_devices()
            .await
            .map(|devices| devices.into_iter().map(|d| d.name).collect::<Vec<_>>());

        if let Ok(names) = &result {
            self.filters.write().await.devices = names.clone();
        }
        self.devices.write().await.complete(ticket, result)
    }

    pub async fn available_devices(&self) -> Vec<String> {
        self.devices.read().await.data().cloned().unwrap_or_default()
    }

    pub async fn filters(&self) -> MonitorFilters {
        self.filters.read().await.clone()
    }

    /// Replace the filters and reload both panels
    pub async fn apply(&self, filters: MonitorFilters) -> PoolResult<()> {
        debug!(
            devices = filters.devices.len(),
            range = ?filters.range,
            resource = ?filters.resource,
            "Applying monitoring filters"
        );
        *self.filters.write().await = filters;
        self.refresh().await
    }

    /// Reload usage totals and the time series concurrently
    pub async fn refresh(&self) -> PoolResult<()> {
        let (usage, series) = tokio::join!(self.load_usage(), self.load_series());
        usage?;
        series?;
        Ok(())
    }

    pub async fn load_usage(&self) -> PoolResult<LoadOutcome> {
        let filters = self.filters().await;
        let ticket = self.usage.write().await.begin();
        let query = UsageQuery::new(filters.range, Utc::now(), filters.devices);
        let result = self
            .state
            .api()
            .get_compute_usage(&query)
            .await
            .map(UsageHours::from);
        self.usage.write().await.complete(ticket, result)
    }

    pub async fn load_series(&self) -> PoolResult<LoadOutcome> {
        let filters = self.filters().await;
        let ticket = self.series.write().await.begin();
        let query = MetricsQuery::new(filters.range, Utc::now(), filters.devices, filters.resource);
        let result = self.state.api().fetch_nodes_metrics(&query).await;
        if let Ok(series) = &result {
            if series.is_empty() {
                warn!("No metrics returned for the selected window");
            }
        }
        self.series.write().await.complete(ticket, result)
    }

    pub async fn usage(&self) -> Option<UsageHours> {
        self.usage.read().await.data().copied()
    }

    pub async fn series(&self) -> Option<UsageSeries> {
        self.series.read().await.data().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{PreferenceStore, Preferences};
    use pooldash_client::{MockPool, MockPoolApi};
    use pooldash_core::{ComputeUsage, Device, UiConfig};
    use serde_json::json;

    fn monitor(api: &MockPoolApi) -> Monitor {
        Monitor::new(Arc::new(AppState::new(
            Arc::new(api.clone()),
            UiConfig::default(),
            PreferenceStore::in_memory(Preferences::default()),
        )))
    }

    #[tokio::test]
    async fn test_all_devices_selected_by_default() {
        let api = MockPoolApi::new(MockPool {
            devices: ["a", "b"]
                .iter()
                .map(|n| Device {
                    name: n.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
        let monitor = monitor(&api);
        monitor.load_devices().await.unwrap();

        let filters = monitor.filters().await;
        assert_eq!(filters.devices, vec!["a", "b"]);
        assert_eq!(filters.range, TimeRange::Last24h);
    }

    #[tokio::test]
    async fn test_refresh_converts_usage_to_hours() {
        let api = MockPoolApi::new(MockPool {
            usage: ComputeUsage {
                cpu: 7200.0,
                ram: 1024.0 * 1024.0 * 1024.0 * 3600.0,
                gpus: 1800.0,
            },
            series: serde_json::from_value(json!({
                "timestamp": ["t0", "t1"],
                "total_resources": [4, 4],
                "used_resources": [1]
            }))
            .unwrap(),
            ..Default::default()
        });
        let monitor = monitor(&api);

        monitor
            .apply(MonitorFilters {
                devices: vec!["a".into()],
                range: TimeRange::Last7d,
                resource: MetricResource::Cpu,
            })
            .await
            .unwrap();

        let hours = monitor.usage().await.unwrap();
        assert_eq!(hours.cpu_hours, 2.0);
        assert_eq!(hours.memory_hours, 1.0);
        assert_eq!(hours.gpu_hours, 0.5);

        let points = monitor.series().await.unwrap().points();
        assert_eq!(points[1].used, 0.0);
        assert!(api.calls().contains(&"fetch_nodes_metrics:cpu".to_string()));
    }
}

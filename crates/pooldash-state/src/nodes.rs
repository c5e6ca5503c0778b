//! Per-node resource table and node actions

use futures::try_join;
use pooldash_core::{combine_nodes, PoolError, PoolResult, ResourceRow};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::panel::{LoadOutcome, Panel};
use crate::session::AppState;

/// Labels and resources of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeDetail {
    pub node: String,
    pub labels: BTreeMap<String, String>,
    /// `(available, total)` per resource key
    pub resources: BTreeMap<String, (f64, f64)>,
}

pub struct NodeBoard {
    state: Arc<AppState>,
    rows: RwLock<Panel<Vec<ResourceRow>>>,
    detail: RwLock<Panel<NodeDetail>>,
}

impl NodeBoard {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            rows: RwLock::new(Panel::new("nodes")),
            detail: RwLock::new(Panel::new("node-detail")),
        }
    }

    /// Fetch devices and GPUs and join them into rows
    pub async fn load(&self) -> PoolResult<LoadOutcome> {
        let ticket = self.rows.write().await.begin();
        let api = self.state.api();
        let result = try_join!(api.fetch_devices(), api.fetch_gpus(false))
            .map(|(devices, gpus)| combine_nodes(&devices, &gpus));
        self.rows.write().await.complete(ticket, result)
    }

    pub async fn rows(&self) -> Vec<ResourceRow> {
        self.rows.read().await.data().cloned().unwrap_or_default()
    }

    pub async fn error(&self) -> Option<String> {
        self.rows.read().await.error().map(str::to_string)
    }

    pub async fn set_cordoned(&self, node: &str, cordoned: bool) -> PoolResult<()> {
        let nodes = [node.to_string()];
        if cordoned {
            self.state.api().cordon_nodes(&nodes).await?;
        } else {
            self.state.api().uncordon_nodes(&nodes).await?;
        }
        info!(node = node, cordoned = cordoned, "Node scheduling changed");
        self.load().await.map(|_| ())
    }

    /// Flip a node between cordoned and schedulable; returns the new state
    pub async fn toggle_cordon(&self, node: &str) -> PoolResult<bool> {
        let current = self
            .rows()
            .await
            .into_iter()
            .find(|r| r.node == node)
            .ok_or_else(|| PoolError::NotFound(format!("node '{}'", node)))?
            .cordoned;
        self.set_cordoned(node, !current).await?;
        Ok(!current)
    }

    pub async fn delete_node(&self, node: &str) -> PoolResult<()> {
        self.state.api().delete_nodes(&[node.to_string()]).await?;
        info!(node = node, "Node deleted");
        self.load().await.map(|_| ())
    }

    /// Fetch labels and resources of one node
    pub async fn load_detail(&self, node: &str) -> PoolResult<LoadOutcome> {
        let ticket = self.detail.write().await.begin();
        let nodes = [node.to_string()];
        let api = self.state.api();
        let result = try_join!(api.get_node_labels(&nodes), api.fetch_resources(Some(&nodes[..])))
            .map(|(mut labels, resources)| NodeDetail {
                node: node.to_string(),
                labels: labels.remove(node).unwrap_or_default(),
                resources: resources.node_detail(),
            });
        self.detail.write().await.complete(ticket, result)
    }

    pub async fn detail(&self) -> Option<NodeDetail> {
        self.detail.read().await.data().cloned()
    }

    /// Add one label to a node and read the detail back
    pub async fn add_label(&self, node: &str, key: &str, value: &str) -> PoolResult<NodeDetail> {
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(PoolError::Validation("Label key and value are required".to_string()));
        }

        let labels = BTreeMap::from([(key.to_string(), value.to_string())]);
        self.state.api().add_node_labels(node, &labels).await?;
        info!(node = node, key = key, "Label added");

        self.load_detail(node).await?;
        self.detail()
            .await
            .ok_or_else(|| PoolError::NotFound(format!("node '{}'", node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{PreferenceStore, Preferences};
    use pooldash_client::{MockPool, MockPoolApi};
    use pooldash_core::{Device, GpuNode, ResourceSnapshot, UiConfig};

    fn api() -> MockPoolApi {
        let mut node_resources = std::collections::HashMap::new();
        node_resources.insert(
            "gpu-1".to_string(),
            ResourceSnapshot {
                total: BTreeMap::from([
                    ("cpu".to_string(), 32.0),
                    ("nvidia.com/gpu".to_string(), 4.0),
                    ("pods".to_string(), 110.0),
                ]),
                available: BTreeMap::from([("cpu".to_string(), 8.0)]),
            },
        );
        MockPoolApi::new(MockPool {
            devices: vec![
                Device {
                    name: "gpu-1".into(),
                    ready: true,
                    ..Default::default()
                },
                Device {
                    name: "cpu-1".into(),
                    ready: true,
                    memory_pressure: true,
                    ..Default::default()
                },
            ],
            gpus: vec![GpuNode {
                node: "gpu-1".into(),
                models: vec!["A100".into()],
                total: 4.0,
                available: 1.0,
                ready: true,
            }],
            node_resources,
            ..Default::default()
        })
    }

    fn board(api: &MockPoolApi) -> NodeBoard {
        NodeBoard::new(Arc::new(AppState::new(
            Arc::new(api.clone()),
            UiConfig::default(),
            PreferenceStore::in_memory(Preferences::default()),
        )))
    }

    #[tokio::test]
    async fn test_rows_combine_devices_and_gpus() {
        let api = api();
        let board = board(&api);
        board.load().await.unwrap();

        let rows = board.rows().await;
        assert_eq!(rows.len(), 2);
        let gpu = rows.iter().find(|r| r.node == "gpu-1").unwrap();
        assert_eq!(gpu.used, 75.0);
        let cpu = rows.iter().find(|r| r.node == "cpu-1").unwrap();
        assert_eq!(cpu.models, "-");
        assert_eq!(cpu.issues, "memory_pressure");
    }

    #[tokio::test]
    async fn test_toggle_cordon_reads_back() {
        let api = api();
        let board = board(&api);
        board.load().await.unwrap();

        assert!(board.toggle_cordon("gpu-1").await.unwrap());
        let row = board.rows().await.into_iter().find(|r| r.node == "gpu-1").unwrap();
        assert!(row.cordoned);
        assert!(!board.toggle_cordon("gpu-1").await.unwrap());
        assert_eq!(api.count("fetch_devices"), 3);

        assert!(matches!(board.toggle_cordon("nope").await, Err(PoolError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_node() {
        let api = api();
        let board = board(&api);
        board.load().await.unwrap();
        board.delete_node("cpu-1").await.unwrap();
        assert_eq!(board.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_label_reads_detail_back() {
        let api = api();
        let board = board(&api);

        assert!(board.add_label("gpu-1", " ", "x").await.is_err());
        let detail = board.add_label("gpu-1", "zone", "eu-west").await.unwrap();
        assert_eq!(detail.labels["zone"], "eu-west");
        assert_eq!(detail.resources["cpu"], (8.0, 32.0));
        assert_eq!(detail.resources["nvidia.com/gpu"], (0.0, 4.0));
        assert!(!detail.resources.contains_key("pods"));
    }
}

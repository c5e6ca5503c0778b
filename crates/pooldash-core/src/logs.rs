//! Log payload shaping

use serde::Serialize;
use serde_json::Value;

const LOGS_NOT_READY: &str = "Logs not ready yet";
const NO_OUTPUT: &str = "(no log output)";

/// Log text of one pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogBlock {
    /// Pod or service name
    pub source: String,
    /// Node the pod runs on, when the backend reports it
    pub node: Option<String>,
    pub text: String,
}

/// What a log panel shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LogView {
    /// Nothing requested yet
    Idle,
    /// The backend returned no pods or no log entries
    Empty,
    Blocks(Vec<LogBlock>),
    /// Backend or transport failure; replaces any partial content
    Error(String),
}

impl LogView {
    /// Shape a job log payload: `{group: {pod: {logs}}}`
    pub fn from_job_logs(value: &Value) -> LogView {
        if let Some(err) = backend_error(value) {
            return LogView::Error(err);
        }
        let mut blocks = Vec::new();
        if let Some(groups) = value.as_object() {
            for group in groups.values() {
                let Some(pods) = group.as_object() else {
                    continue;
                };
                for (pod, info) in pods {
                    let text = info
                        .get("logs")
                        .and_then(Value::as_str)
                        .unwrap_or(LOGS_NOT_READY)
                        .to_string();
                    blocks.push(LogBlock {
                        source: pod.clone(),
                        node: None,
                        text,
                    });
                }
            }
        }
        Self::from_blocks(blocks)
    }

    /// Shape a service log payload: `{service: {logs, pod: {spec: {node_name}}}}`
    pub fn from_service_logs(value: &Value) -> LogView {
        if let Some(err) = backend_error(value) {
            return LogView::Error(err);
        }
        let blocks = value
            .as_object()
            .map(|services| {
                services
                    .iter()
                    .map(|(name, info)| LogBlock {
                        source: name.clone(),
                        node: info
                            .pointer("/pod/spec/node_name")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        text: info
                            .get("logs")
                            .and_then(Value::as_str)
                            .unwrap_or(NO_OUTPUT)
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self::from_blocks(blocks)
    }

    fn from_blocks(blocks: Vec<LogBlock>) -> LogView {
        if blocks.is_empty() {
            LogView::Empty
        } else {
            LogView::Blocks(blocks)
        }
    }

    /// Plain-text rendering grouped per pod
    pub fn render(&self) -> String {
        match self {
            LogView::Idle => String::new(),
            LogView::Empty => "No logs yet".to_string(),
            LogView::Error(err) => format!("Error: {}", err),
            LogView::Blocks(blocks) => {
                let mut lines = Vec::new();
                for block in blocks {
                    lines.push("------".to_string());
                    match &block.node {
                        Some(node) => lines.push(format!("--> {} in {}", block.source, node)),
                        None => lines.push(format!("--> {}", block.source)),
                    }
                    lines.push("------".to_string());
                    lines.push(block.text.clone());
                    lines.push(String::new());
                }
                lines.join("\n")
            }
        }
    }
}

fn backend_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

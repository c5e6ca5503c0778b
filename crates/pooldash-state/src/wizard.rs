//! Deployment wizard
//!
//! Three steps: pick a template, pick target labels, fill in parameters.
//! Submission is single-flight per wizard.

use pooldash_core::{
    build_params, CustomDeployRequest, DeployRequest, LabelMode, ParameterForm, PoolError,
    PoolResult, TemplateDefinition, TemplateSummary,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::jobs::JobBoard;
use crate::notice::Notice;
use crate::panel::LoadOutcome;
use crate::session::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum WizardStep {
    #[default]
    SelectTemplate,
    SelectTargets,
    SetParameters,
}

impl WizardStep {
    pub fn index(&self) -> usize {
        match self {
            WizardStep::SelectTemplate => 0,
            WizardStep::SelectTargets => 1,
            WizardStep::SetParameters => 2,
        }
    }

    fn next(self) -> Self {
        match self {
            WizardStep::SelectTemplate => WizardStep::SelectTargets,
            _ => WizardStep::SetParameters,
        }
    }

    fn prev(self) -> Self {
        match self {
            WizardStep::SetParameters => WizardStep::SelectTargets,
            _ => WizardStep::SelectTemplate,
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardStep::SelectTemplate => write!(f, "Select template"),
            WizardStep::SelectTargets => write!(f, "Select targets"),
            WizardStep::SetParameters => write!(f, "Set parameters"),
        }
    }
}

/// Renderable wizard state
#[derive(Debug, Clone, Default)]
pub struct WizardView {
    pub open: bool,
    pub step: WizardStep,
    pub templates: Vec<TemplateSummary>,
    /// Selectable target labels, `key: value`
    pub available_labels: Vec<String>,
    pub selected_template: Option<String>,
    pub definition: Option<TemplateDefinition>,
    pub template_loading: bool,
    pub form: ParameterForm,
    pub target_labels: BTreeMap<String, Vec<String>>,
    pub label_mode: LabelMode,
    pub job_name: String,
    /// Last failure, backend messages verbatim
    pub last_error: Option<String>,
}

/// Clears the in-flight flag when the submission ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> PoolResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlight(flag))
            .map_err(|_| PoolError::Busy("deployment already being submitted".to_string()))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DeploymentWizard {
    state: Arc<AppState>,
    jobs: Arc<JobBoard>,
    view: RwLock<WizardView>,
    /// Generation of the latest template detail fetch
    template_generation: RwLock<u64>,
    submitting: AtomicBool,
}

impl DeploymentWizard {
    pub fn new(state: Arc<AppState>, jobs: Arc<JobBoard>) -> Self {
        Self {
            state,
            jobs,
            view: RwLock::new(WizardView::default()),
            template_generation: RwLock::new(0),
            submitting: AtomicBool::new(false),
        }
    }

    pub async fn view(&self) -> WizardView {
        self.view.read().await.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Reset and open the wizard, loading the template catalogue and the
    /// target label catalogue
    pub async fn open(&self) {
        *self.template_generation.write().await += 1;
        *self.view.write().await = WizardView {
            open: true,
            ..Default::default()
        };

        let templates = match self.state.api().fetch_job_templates().await {
            Ok(templates) => templates,
            Err(e) => {
                warn!(error = %e, "Failed to load templates");
                self.view.write().await.last_error =
                    Some(format!("Failed to load templates: {}", e.user_message()));
                Vec::new()
            }
        };
        let labels = self.label_catalogue().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load node labels");
            Vec::new()
        });

        debug!(templates = templates.len(), labels = labels.len(), "Wizard opened");
        let mut view = self.view.write().await;
        view.templates = templates;
        view.available_labels = labels;
    }

    /// Every `key: value` label present on a pool node, sorted
    async fn label_catalogue(&self) -> PoolResult<Vec<String>> {
        let devices = self.state.api().fetch_devices().await?;
        let nodes: Vec<String> = devices.into_iter().map(|d| d.name).collect();
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let labels = self.state.api().get_node_labels(&nodes).await?;
        let catalogue: BTreeSet<String> = labels
            .values()
            .flat_map(|node| node.iter().map(|(k, v)| format!("{}: {}", k, v)))
            .collect();
        Ok(catalogue.into_iter().collect())
    }

    /// Close without cancelling anything in flight
    pub async fn close(&self) {
        self.view.write().await.open = false;
    }

    /// Advance one step; blocked on the first step until a template is chosen
    pub async fn next(&self) -> PoolResult<WizardStep> {
        let mut view = self.view.write().await;
        if view.step == WizardStep::SelectTemplate && view.selected_template.is_none() {
            return Err(PoolError::NotReady("Select a template first".to_string()));
        }
        view.step = view.step.next();
        Ok(view.step)
    }

    pub async fn back(&self) -> WizardStep {
        let mut view = self.view.write().await;
        view.step = view.step.prev();
        view.step
    }

    /// Select a template and rebuild the parameter form from its definition.
    ///
    /// Earlier parameters and entered values are discarded. If another
    /// template is selected before this fetch returns, its result is dropped.
    pub async fn select_template(&self, name: &str) -> PoolResult<LoadOutcome> {
        let generation = {
            let mut generation = self.template_generation.write().await;
            *generation += 1;
            *generation
        };
        {
            let mut view = self.view.write().await;
            view.selected_template = Some(name.to_string());
            view.definition = None;
            view.form = ParameterForm::default();
            view.template_loading = true;
        }

        let result = self.state.api().fetch_template_all(name).await;

        if *self.template_generation.read().await != generation {
            debug!(template = name, generation, "Dropping stale template definition");
            return Ok(LoadOutcome::Stale);
        }

        let mut view = self.view.write().await;
        view.template_loading = false;
        match result {
            Ok(definition) => {
                let params = build_params(&definition);
                info!(template = name, params = params.len(), "Template loaded");
                view.form = ParameterForm::new(params);
                view.definition = Some(definition);
                Ok(LoadOutcome::Applied)
            }
            Err(e) => {
                warn!(template = name, error = %e, "Failed to load template");
                view.last_error = Some(format!("Failed to load template: {}", e.user_message()));
                Err(e)
            }
        }
    }

    pub async fn set_param(&self, name: &str, raw: &str) -> PoolResult<()> {
        self.view.write().await.form.set_input(name, raw)
    }

    pub async fn toggle_param(&self, name: &str) -> PoolResult<bool> {
        self.view.write().await.form.toggle(name)
    }

    /// Add a `key: value` label to the targets. The key is everything before
    /// the first `:`.
    pub async fn add_target_label(&self, encoded: &str) -> PoolResult<()> {
        let (key, value) = encoded.split_once(':').ok_or_else(|| {
            PoolError::Validation(format!("Label '{}' must look like key: value", encoded))
        })?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return Err(PoolError::Validation(format!("Label '{}' has no key", encoded)));
        }

        let mut view = self.view.write().await;
        let values = view.target_labels.entry(key.to_string()).or_default();
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
        Ok(())
    }

    pub async fn remove_target_label(&self, key: &str, value: &str) {
        let mut view = self.view.write().await;
        if let Some(values) = view.target_labels.get_mut(key) {
            values.retain(|v| v != value);
            if values.is_empty() {
                view.target_labels.remove(key);
            }
        }
    }

    /// Combination mode for all selected labels
    pub async fn set_label_mode(&self, mode: LabelMode) {
        self.view.write().await.label_mode = mode;
    }

    pub async fn set_job_name(&self, name: &str) {
        self.view.write().await.job_name = name.to_string();
    }

    /// Deployment request from the current wizard state
    pub async fn build_request(&self) -> PoolResult<DeployRequest> {
        let view = self.view.read().await;
        let name = view.job_name.trim().to_lowercase();
        if name.is_empty() {
            return Err(PoolError::Validation("Job name is required".to_string()));
        }
        let template_name = view
            .selected_template
            .clone()
            .ok_or_else(|| PoolError::Validation("Select a template first".to_string()))?;

        let (target_labels, target_labels_ops) = if view.target_labels.is_empty() {
            (None, None)
        } else {
            (Some(view.target_labels.clone()), Some(view.label_mode))
        };

        Ok(DeployRequest {
            name,
            template_name,
            values: view.form.to_values(),
            force_namespace: self.state.namespace().current().forced_namespace(),
            target_labels,
            target_labels_ops,
        })
    }

    /// Deploy the selected template.
    ///
    /// On success the wizard closes and the job list is reloaded. On failure
    /// it stays open with the error recorded.
    pub async fn submit(&self) -> PoolResult<Notice> {
        let request = self.build_request().await?;
        let _in_flight = InFlight::acquire(&self.submitting)?;

        info!(
            job = %request.name,
            template = %request.template_name,
            namespace = ?request.force_namespace,
            "Submitting deployment"
        );
        let result = self.state.api().deploy_job(&request).await;
        self.finish(result, format!("Job \"{}\" submitted", request.name)).await
    }

    /// Deploy an ad-hoc template with the wizard's targets and namespace
    pub async fn submit_custom(
        &self,
        template_str: String,
        values: Map<String, Value>,
        default_values: Option<Map<String, Value>>,
    ) -> PoolResult<Notice> {
        if template_str.trim().is_empty() {
            return Err(PoolError::Validation("Template is required".to_string()));
        }
        let target_labels = {
            let view = self.view.read().await;
            Some(view.target_labels.clone()).filter(|l| !l.is_empty())
        };
        let request = CustomDeployRequest {
            template_str,
            values,
            force_namespace: self.state.namespace().current().forced_namespace(),
            default_values,
            target_labels,
        };

        let _in_flight = InFlight::acquire(&self.submitting)?;
        info!(namespace = ?request.force_namespace, "Submitting custom deployment");
        let result = self.state.api().deploy_custom_job(&request).await;
        self.finish(result, "Custom job submitted".to_string()).await
    }

    async fn finish(&self, result: PoolResult<()>, success: String) -> PoolResult<Notice> {
        match result {
            Ok(()) => {
                {
                    let mut view = self.view.write().await;
                    view.open = false;
                    view.last_error = None;
                }
                if let Err(e) = self.jobs.load().await {
                    warn!(error = %e, "Job list reload failed");
                }
                Ok(Notice::Success(success))
            }
            Err(e) => {
                warn!(error = %e, "Deployment failed");
                self.view.write().await.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{PreferenceStore, Preferences};
    use pooldash_client::{MockFailure, MockPool, MockPoolApi};
    use pooldash_core::{Device, ParamValue, UiConfig};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn definition(values: Value, properties: Value, required: &[&str]) -> TemplateDefinition {
        serde_json::from_value(json!({
            "values": values,
            "schema": {"properties": properties, "required": required},
        }))
        .unwrap()
    }

    fn api() -> MockPoolApi {
        let mut definitions = HashMap::new();
        definitions.insert(
            "vllm".to_string(),
            definition(
                json!({"model_id": "Qwen/Qwen2-0.5B", "replicas": 1}),
                json!({"model_id": {"type": "string"}, "replicas": {"type": "integer"}}),
                &["model_id"],
            ),
        );
        definitions.insert(
            "ollama".to_string(),
            definition(
                json!({"model_name": "llama3", "use_gpu": true}),
                json!({"model_name": {"type": "string"}, "use_gpu": {"type": "boolean"}}),
                &[],
            ),
        );

        let mut labels = BTreeMap::new();
        labels.insert(
            "node-a".to_string(),
            [("gpu".to_string(), "a100".to_string()), ("zone".to_string(), "eu".to_string())]
                .into_iter()
                .collect(),
        );
        labels.insert(
            "node-b".to_string(),
            [("gpu".to_string(), "a100".to_string())].into_iter().collect(),
        );

        MockPoolApi::new(MockPool {
            devices: ["node-a", "node-b"]
                .iter()
                .map(|n| Device {
                    name: n.to_string(),
                    ready: true,
                    ..Default::default()
                })
                .collect(),
            templates: vec![
                TemplateSummary { name: "vllm".into(), description: None },
                TemplateSummary { name: "ollama".into(), description: None },
            ],
            definitions,
            labels,
            ..Default::default()
        })
    }

    fn wizard(api: &MockPoolApi) -> DeploymentWizard {
        let state = Arc::new(AppState::new(
            Arc::new(api.clone()),
            UiConfig::default(),
            PreferenceStore::in_memory(Preferences::default()),
        ));
        let jobs = Arc::new(JobBoard::new(state.clone()));
        DeploymentWizard::new(state, jobs)
    }

    #[tokio::test]
    async fn test_open_loads_catalogues() {
        let api = api();
        let wizard = wizard(&api);
        wizard.open().await;

        let view = wizard.view().await;
        assert!(view.open);
        assert_eq!(view.templates.len(), 2);
        assert_eq!(view.available_labels, vec!["gpu: a100", "zone: eu"]);
    }

    #[tokio::test]
    async fn test_step_navigation() {
        let api = api();
        let wizard = wizard(&api);
        wizard.open().await;

        assert!(matches!(wizard.next().await, Err(PoolError::NotReady(_))));
        assert_eq!(wizard.back().await, WizardStep::SelectTemplate);

        wizard.select_template("vllm").await.unwrap();
        assert_eq!(wizard.next().await.unwrap(), WizardStep::SelectTargets);
        assert_eq!(wizard.next().await.unwrap(), WizardStep::SetParameters);
        assert_eq!(wizard.next().await.unwrap(), WizardStep::SetParameters);
        assert_eq!(wizard.back().await, WizardStep::SelectTargets);
        assert_eq!(wizard.back().await.index(), 0);
    }

    #[tokio::test]
    async fn test_selecting_template_replaces_form() {
        let api = api();
        let wizard = wizard(&api);

        wizard.select_template("vllm").await.unwrap();
        wizard.set_param("replicas", "3").await.unwrap();

        wizard.select_template("ollama").await.unwrap();
        let view = wizard.view().await;
        assert!(view.form.params().get("replicas").is_none());
        assert_eq!(view.form.value("use_gpu"), Some(ParamValue::Boolean(true)));

        wizard.select_template("vllm").await.unwrap();
        let form = wizard.view().await.form;
        assert_eq!(form.value("replicas"), Some(ParamValue::Integer(1)));
    }

    #[tokio::test]
    async fn test_stale_template_fetch_is_dropped() {
        let api = api();
        api.set_latency("fetch_template_all:vllm", Duration::from_millis(50));
        let wizard = wizard(&api);

        let (slow, fast) = tokio::join!(wizard.select_template("vllm"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            wizard.select_template("ollama").await
        });

        assert_eq!(slow.unwrap(), LoadOutcome::Stale);
        assert_eq!(fast.unwrap(), LoadOutcome::Applied);
        let view = wizard.view().await;
        assert_eq!(view.selected_template.as_deref(), Some("ollama"));
        assert!(view.form.params().get("model_name").is_some());
    }

    #[tokio::test]
    async fn test_target_labels() {
        let api = api();
        let wizard = wizard(&api);

        wizard.add_target_label("gpu: a100").await.unwrap();
        wizard.add_target_label("gpu: a100").await.unwrap();
        wizard.add_target_label("gpu: h100").await.unwrap();
        wizard.add_target_label("url: http://x").await.unwrap();
        assert!(wizard.add_target_label("no-colon").await.is_err());

        let view = wizard.view().await;
        assert_eq!(view.target_labels["gpu"], vec!["a100", "h100"]);
        assert_eq!(view.target_labels["url"], vec!["http://x"]);

        wizard.remove_target_label("url", "http://x").await;
        assert!(!wizard.view().await.target_labels.contains_key("url"));
    }

    #[tokio::test]
    async fn test_submit_normalizes_and_attaches_context() {
        let api = api();
        let wizard = wizard(&api);
        wizard.state.select_namespace(Some("alice".into()));

        wizard.open().await;
        wizard.select_template("vllm").await.unwrap();
        wizard.set_job_name("  My-Job ").await;
        let notice = wizard.submit().await.unwrap();
        assert!(!notice.is_error());

        let sent = api.with_pool(|p| p.deployed.clone());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, "my-job");
        assert_eq!(sent[0].force_namespace.as_deref(), Some("alice"));
        assert!(sent[0].target_labels.is_none());
        assert!(sent[0].target_labels_ops.is_none());
        assert_eq!(sent[0].values["model_id"], json!("Qwen/Qwen2-0.5B"));

        assert!(!wizard.view().await.open);
        assert_eq!(wizard.jobs.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_with_labels_sends_mode() {
        let api = api();
        let wizard = wizard(&api);
        wizard.select_template("ollama").await.unwrap();
        wizard.add_target_label("zone: eu").await.unwrap();
        wizard.set_label_mode(LabelMode::Or).await;
        assert!(!wizard.toggle_param("use_gpu").await.unwrap());
        wizard.set_job_name("chat").await;
        wizard.submit().await.unwrap();

        let sent = api.with_pool(|p| p.deployed[0].clone());
        assert_eq!(sent.values["use_gpu"], json!(false));
        assert_eq!(sent.target_labels_ops, Some(LabelMode::Or));
        assert_eq!(sent.target_labels.unwrap()["zone"], vec!["eu"]);
        assert!(sent.force_namespace.is_none());
    }

    #[tokio::test]
    async fn test_submit_requires_name_and_template() {
        let api = api();
        let wizard = wizard(&api);

        wizard.set_job_name("job").await;
        assert!(matches!(wizard.submit().await, Err(PoolError::Validation(_))));

        wizard.select_template("vllm").await.unwrap();
        wizard.set_job_name("   ").await;
        assert!(matches!(wizard.submit().await, Err(PoolError::Validation(_))));
        assert_eq!(api.count("deploy_job"), 0);
    }

    #[tokio::test]
    async fn test_failed_submit_stays_open_with_backend_message() {
        let api = api();
        api.fail("deploy_job", MockFailure::Backend("Quota exceeded for namespace alice".into()));
        let wizard = wizard(&api);
        wizard.open().await;
        wizard.select_template("vllm").await.unwrap();
        wizard.set_job_name("big").await;

        assert!(wizard.submit().await.is_err());
        let view = wizard.view().await;
        assert!(view.open);
        assert_eq!(view.last_error.as_deref(), Some("Quota exceeded for namespace alice"));
        assert!(!wizard.is_submitting());
    }

    #[tokio::test]
    async fn test_concurrent_submit_issues_one_write() {
        let api = api();
        api.set_latency("deploy_job", Duration::from_millis(30));
        let wizard = wizard(&api);
        wizard.select_template("vllm").await.unwrap();
        wizard.set_job_name("once").await;

        let (first, second) = tokio::join!(wizard.submit(), wizard.submit());
        let busy = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(PoolError::Busy(_))))
            .count();
        assert_eq!(busy, 1);
        assert_eq!(api.count("deploy_job"), 1);
    }

    #[tokio::test]
    async fn test_custom_deploy() {
        let api = api();
        let wizard = wizard(&api);
        wizard.add_target_label("gpu: a100").await.unwrap();

        let mut values = Map::new();
        values.insert("replicas".into(), json!(2));
        wizard
            .submit_custom("apiVersion: v1\nkind: Job".into(), values, None)
            .await
            .unwrap();

        let sent = api.with_pool(|p| p.custom_deployed.clone());
        assert_eq!(sent.len(), 1);
        assert!(sent[0].target_labels.is_some());
        assert!(wizard.submit_custom(" ".into(), Map::new(), None).await.is_err());
    }
}

//! CLI commands implementation

use anyhow::{anyhow, bail, Result};
use pooldash_client::ApiClient;
use pooldash_core::{
    round2, DashboardConfig, Gauge, LabelMode, MetricResource, PoolError, QuotaLimits, QuotaMeter,
    TimeRange,
};
use pooldash_state::{
    bulk_delete_notice, AppState, Debouncer, DeploymentWizard, JobBoard, LoadOutcome, LogPoller,
    LogTarget, Monitor, MonitorFilters, NodeBoard, Overview, PreferenceStore, ServiceBoard,
    NO_SERVICES,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Application state shared by every command
pub struct Session {
    state: Arc<AppState>,
}

impl Session {
    pub async fn connect(config: &DashboardConfig) -> Result<Self> {
        let client = ApiClient::new(&config.api)?;
        let prefs = PreferenceStore::load(config.storage.prefs_path.clone()).await;
        debug!(api = %client.base_url(), "Using management API");

        Ok(Self {
            state: Arc::new(AppState::new(Arc::new(client), config.ui.clone(), prefs)),
        })
    }

    pub async fn authorize(&self, user_key: Option<&str>) -> Result<()> {
        if self.state.authorize(user_key.unwrap_or_default()).await {
            return Ok(());
        }
        let auth = self.state.auth().await;
        bail!(auth.error.unwrap_or_else(|| "Invalid user key".to_string()))
    }

    /// Load connection state, then pin the namespace filter if asked to.
    /// `None` with `all` unset keeps the operator's default namespace.
    async fn scope(&self, namespace: Option<String>, all: bool) {
        if let Err(e) = self.state.load_connection_state().await {
            warn!(error = %e, "Could not load connection state");
        }
        if all {
            self.state.select_namespace(None);
        } else if let Some(namespace) = namespace {
            self.state.select_namespace(Some(namespace));
        }
    }
}

/// Backend messages are shown as the backend wrote them
fn surface(e: PoolError) -> anyhow::Error {
    anyhow!(e.user_message())
}

fn print_gauge(label: &str, gauge: Gauge, unit: &str) {
    println!(
        "  {:<8} {:>8} / {:<8} {} available ({:.0}% in use)",
        label,
        round2(gauge.online),
        round2(gauge.total),
        unit,
        gauge.fill_percent()
    );
}

fn print_meter(label: &str, meter: QuotaMeter) {
    println!("  {:<8} {:>6} / {:<6} ({}%)", label, meter.used, meter.max, meter.ratio());
}

/// Split `key=value`
fn key_value(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .ok_or_else(|| anyhow!("'{}' must look like key=value", raw))
}

/// Show connectivity and agent status
pub async fn status(session: &Session) -> Result<()> {
    session.scope(None, false).await;
    let status = session.state.refresh_status().await.map_err(surface)?;
    let conn = session.state.connection().await;

    println!("Connected:     {}", status.connected);
    println!("Agent running: {}", status.agent_running);
    println!("Server node:   {}", status.is_server);
    println!("Namespaces:    {}", conn.user_spaces.join(", "));
    if let Some(space) = conn.selected_user_space {
        println!("Default:       {}", space);
    }
    Ok(())
}

/// Show pool capacity and the job count
pub async fn dashboard(session: &Session) -> Result<()> {
    session.scope(None, false).await;
    let overview = Overview::new(session.state.clone());
    overview.load().await.map_err(surface)?;

    let Some(loaded) = overview.overview().await else {
        bail!("No resource data available");
    };
    let summary = loaded.summary;

    println!("Pool capacity:");
    print_gauge("CPUs", summary.cpu(), "cores");
    print_gauge("GPUs", summary.gpu(), "devices");
    print_gauge("RAM", summary.ram(), "GB");
    print_gauge("Nodes", summary.devices(), "online");
    println!();
    println!("Jobs: {}", loaded.job_count);

    if let Some(quota) = session.state.connection().await.quota {
        println!();
        println!("Quota:");
        print_meter("CPU", quota.cpu);
        print_meter("GPU", quota.gpu);
        print_meter("Memory", quota.memory);
    }
    Ok(())
}

/// Show resource usage over a time window
pub async fn usage(
    session: &Session,
    range: Option<String>,
    resource: String,
    devices: Vec<String>,
) -> Result<()> {
    let monitor = Monitor::new(session.state.clone());
    monitor.load_devices().await.map_err(surface)?;

    let known = monitor.available_devices().await;
    if let Some(unknown) = devices.iter().find(|d| !known.contains(d)) {
        bail!("Unknown device '{}'", unknown);
    }

    let defaults = monitor.filters().await;
    let filters = MonitorFilters {
        devices: if devices.is_empty() {
            defaults.devices
        } else {
            devices
        },
        range: match range {
            Some(range) => range.parse::<TimeRange>()?,
            None => defaults.range,
        },
        resource: resource.parse::<MetricResource>()?,
    };
    monitor.apply(filters).await.map_err(surface)?;

    if let Some(hours) = monitor.usage().await {
        println!("CPU hours:     {}", round2(hours.cpu_hours));
        println!("Memory GiB-h:  {}", round2(hours.memory_hours));
        println!("GPU hours:     {}", round2(hours.gpu_hours));
    }

    let points = monitor.series().await.map(|s| s.points()).unwrap_or_default();
    if points.is_empty() {
        println!("\nNo metrics for this window");
        return Ok(());
    }
    println!();
    println!("{:<28} {:>10} {:>10}", "TIMESTAMP", "USED", "TOTAL");
    println!("{}", "-".repeat(50));
    for point in points {
        println!(
            "{:<28} {:>10} {:>10}",
            point.timestamp,
            round2(point.used),
            round2(point.total)
        );
    }
    Ok(())
}

/// List pool devices with their GPUs and conditions
pub async fn devices(session: &Session) -> Result<()> {
    let board = NodeBoard::new(session.state.clone());
    board.load().await.map_err(surface)?;
    let rows = board.rows().await;

    if rows.is_empty() {
        println!("No devices found");
        return Ok(());
    }
    println!(
        "{:<24} {:<6} {:<9} {:>6} {:>6}  {:<30} {}",
        "NODE", "READY", "CORDONED", "GPUS", "USED%", "MODELS", "ISSUES"
    );
    println!("{}", "-".repeat(100));
    for row in rows {
        println!(
            "{:<24} {:<6} {:<9} {:>6} {:>6}  {:<30} {}",
            row.node,
            row.ready,
            row.cordoned,
            row.total,
            row.used,
            row.models.replace('\n', ", "),
            row.issues
        );
    }
    Ok(())
}

pub async fn cordon(session: &Session, node: &str, cordoned: bool) -> Result<()> {
    let board = NodeBoard::new(session.state.clone());
    board.set_cordoned(node, cordoned).await.map_err(surface)?;
    if cordoned {
        println!("Node '{}' cordoned", node);
    } else {
        println!("Node '{}' uncordoned", node);
    }
    Ok(())
}

pub async fn delete_node(session: &Session, node: &str) -> Result<()> {
    let board = NodeBoard::new(session.state.clone());
    board.delete_node(node).await.map_err(surface)?;
    println!("Node '{}' deleted", node);
    Ok(())
}

fn print_node_detail(detail: &pooldash_state::NodeDetail) {
    println!("Node: {}", detail.node);
    println!("\nLabels:");
    if detail.labels.is_empty() {
        println!("  (none)");
    }
    for (key, value) in &detail.labels {
        println!("  {}: {}", key, value);
    }
    println!("\nResources (available / total):");
    for (key, (available, total)) in &detail.resources {
        println!("  {:<16} {} / {}", key, round2(*available), round2(*total));
    }
}

/// Show the labels and resources of a node
pub async fn labels(session: &Session, node: &str) -> Result<()> {
    let board = NodeBoard::new(session.state.clone());
    board.load_detail(node).await.map_err(surface)?;
    match board.detail().await {
        Some(detail) => print_node_detail(&detail),
        None => bail!("No details for node '{}'", node),
    }
    Ok(())
}

pub async fn label(session: &Session, node: &str, key: &str, value: &str) -> Result<()> {
    let board = NodeBoard::new(session.state.clone());
    let detail = board.add_label(node, key, value).await.map_err(surface)?;
    println!("Label {}={} added", key.trim(), value.trim());
    print_node_detail(&detail);
    Ok(())
}

/// List jobs
pub async fn jobs(
    session: &Session,
    namespace: Option<String>,
    all: bool,
    page: usize,
) -> Result<()> {
    session.scope(namespace, all).await;
    let board = JobBoard::new(session.state.clone());
    if board.load().await.map_err(surface)? == LoadOutcome::Skipped {
        bail!("No default namespace yet; pass --namespace or --all");
    }
    board.set_page(page).await;
    let page = board.page().await;

    println!("Namespace: {}", session.state.namespace().current());
    if page.jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }
    println!(
        "{:<24} {:<16} {:<10} {:<8} {:<24} {}",
        "NAME", "OWNER", "STATUS", "WORKERS", "HOSTS", "ENDPOINTS"
    );
    println!("{}", "-".repeat(110));
    for job in &page.jobs {
        let endpoints: Vec<String> = job
            .endpoints
            .iter()
            .map(|(name, url)| format!("{}={}", name, url))
            .collect();
        println!(
            "{:<24} {:<16} {:<10} {:<8} {:<24} {}",
            job.name,
            job.owner,
            job.status,
            job.workers,
            job.host_node_list().join(","),
            endpoints.join(" ")
        );
    }
    println!(
        "\nPage {}/{} ({} jobs)",
        page.page, page.total_pages, page.total_jobs
    );
    Ok(())
}

/// Show the spec and conditions of a job
pub async fn job(session: &Session, name: &str, namespace: Option<String>) -> Result<()> {
    let all = namespace.is_none();
    session.scope(namespace, all).await;

    let board = JobBoard::new(session.state.clone());
    board.load().await.map_err(surface)?;
    let Some(job) = board.find(name).await else {
        bail!("Job '{}' not found", name);
    };

    println!("Job: {} ({})", job.name, job.owner);
    println!("Status: {} [{}]", job.status, job.tone());
    println!("\nSpec:\n{}", job.spec_text());
    println!("\nConditions:\n{}", job.conditions_text());
    Ok(())
}

/// Job names containing `query`, ignoring case
fn matching_names<'a>(names: &'a [String], query: &str) -> Vec<&'a str> {
    let query = query.to_lowercase();
    names
        .iter()
        .filter(|n| n.to_lowercase().contains(&query))
        .map(String::as_str)
        .collect()
}

fn print_matches(names: &[String], query: &str) {
    let matches = matching_names(names, query);
    if matches.is_empty() {
        println!("No jobs match '{}'", query);
    }
    for name in matches {
        println!("  {}", name);
    }
}

/// Read queries from stdin and print matching job names once typing pauses
pub async fn search(session: &Session) -> Result<()> {
    let names = session
        .state
        .api()
        .fetch_job_names()
        .await
        .map_err(surface)?;
    let quiet = Duration::from_millis(session.state.ui().search_debounce_ms);
    let (debouncer, mut queries) = Debouncer::new(quiet);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(query) => debouncer.push(query.trim()),
                None => break,
            },
            Some(query) = queries.recv() => print_matches(&names, &query),
        }
    }

    // Input closed; let the last query through
    if let Ok(Some(query)) = tokio::time::timeout(quiet * 2, queries.recv()).await {
        print_matches(&names, &query);
    }
    Ok(())
}

/// List job templates, or show the parameters of one
pub async fn templates(session: &Session, name: Option<String>) -> Result<()> {
    let Some(name) = name else {
        let templates = session
            .state
            .api()
            .fetch_job_templates()
            .await
            .map_err(surface)?;
        if templates.is_empty() {
            println!("No templates available");
        }
        for template in templates {
            match template.description {
                Some(description) => println!("{:<24} {}", template.name, description),
                None => println!("{}", template.name),
            }
        }
        return Ok(());
    };

    let jobs = Arc::new(JobBoard::new(session.state.clone()));
    let wizard = DeploymentWizard::new(session.state.clone(), jobs);
    wizard.select_template(&name).await.map_err(surface)?;
    let view = wizard.view().await;

    println!("{:<28} {:<8} {:<9} {}", "PARAMETER", "TYPE", "REQUIRED", "DEFAULT");
    println!("{}", "-".repeat(80));
    for param in view.form.params().iter() {
        let value = view.form.value(&param.name).map(|v| v.display()).unwrap_or_default();
        println!(
            "{:<28} {:<8} {:<9} {}",
            param.name, param.kind, param.required, value
        );
        if !param.description.is_empty() {
            println!("    {}", param.description);
        }
        if let Some(options) = &param.options {
            println!("    one of: {}", options.join(", "));
        }
    }
    Ok(())
}

pub struct DeployArgs {
    pub template: String,
    pub name: String,
    pub params: Vec<String>,
    pub targets: Vec<String>,
    pub mode: Option<String>,
    pub namespace: Option<String>,
}

/// Deploy a job through the wizard
pub async fn deploy(session: &Session, args: DeployArgs) -> Result<()> {
    session.scope(args.namespace, false).await;

    let jobs = Arc::new(JobBoard::new(session.state.clone()));
    let wizard = DeploymentWizard::new(session.state.clone(), jobs);
    wizard.open().await;
    wizard.select_template(&args.template).await.map_err(surface)?;

    for raw in &args.targets {
        let (key, value) = key_value(raw)?;
        wizard
            .add_target_label(&format!("{}: {}", key, value))
            .await
            .map_err(surface)?;
    }
    if let Some(mode) = args.mode {
        wizard.set_label_mode(mode.parse::<LabelMode>()?).await;
    }
    for raw in &args.params {
        let (key, value) = key_value(raw)?;
        wizard.set_param(key, value).await.map_err(surface)?;
    }
    wizard.set_job_name(&args.name).await;

    let notice = wizard.submit().await.map_err(surface)?;
    println!("{}", notice);
    Ok(())
}

/// Delete jobs by name, one at a time
pub async fn delete(
    session: &Session,
    names: Vec<String>,
    namespace: Option<String>,
) -> Result<()> {
    let all = namespace.is_none();
    session.scope(namespace, all).await;

    let board = JobBoard::new(session.state.clone());
    board.load().await.map_err(surface)?;
    for name in &names {
        match board.find(name).await {
            Some(job) => {
                board.toggle_select(&job.job_id).await;
            }
            None => eprintln!("Job '{}' not found", name),
        }
    }
    if board.selected().await.is_empty() {
        bail!("Nothing to delete");
    }

    let outcome = board.bulk_delete().await;
    let notice = bulk_delete_notice(&outcome);
    if notice.is_error() {
        bail!(notice.text().to_string());
    }
    println!("{}", notice);
    Ok(())
}

pub struct LogArgs {
    pub job: String,
    pub tail: Option<u32>,
    pub pod: Option<String>,
    pub namespace: Option<String>,
    pub follow: bool,
    pub interval: u64,
}

async fn poll(poller: &LogPoller, follow: bool, interval: u64) -> Result<()> {
    if !follow {
        println!("{}", poller.view().await.render());
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poller.refresh().await {
                    warn!(error = %e, "Log refresh failed");
                }
                println!("{}", poller.view().await.render());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    poller.close().await;
    Ok(())
}

/// Show the logs of a job
pub async fn logs(session: &Session, args: LogArgs) -> Result<()> {
    let all = args.namespace.is_none();
    session.scope(args.namespace, all).await;

    let board = JobBoard::new(session.state.clone());
    board.load().await.map_err(surface)?;
    let Some(job) = board.find(&args.job).await else {
        bail!("Job '{}' not found", args.job);
    };

    let target = match LogTarget::for_job(&job) {
        LogTarget::Job {
            job_id, namespace, ..
        } => LogTarget::Job {
            job_id,
            namespace,
            pod: args.pod,
        },
        other => other,
    };

    let poller = LogPoller::new(session.state.clone());
    let tail = args.tail.unwrap_or(session.state.ui().log_tail);
    match poller.open(target, tail).await {
        Err(e) if !args.follow => return Err(surface(e)),
        Err(e) => warn!(error = %e, "Initial log fetch failed"),
        Ok(_) => {}
    }
    poll(&poller, args.follow, args.interval).await
}

/// Show the logs of the pool services
pub async fn service_logs(session: &Session, tail: Option<u32>) -> Result<()> {
    let poller = LogPoller::new(session.state.clone());
    let tail = tail.unwrap_or(session.state.ui().log_tail);
    poller.open(LogTarget::Services, tail).await.map_err(surface)?;
    poll(&poller, false, 0).await
}

/// List pool services
pub async fn services(session: &Session, namespace: Option<String>) -> Result<()> {
    let all = namespace.is_none();
    session.scope(namespace, all).await;

    let board = ServiceBoard::new(session.state.clone());
    board.load().await.map_err(surface)?;
    let services = board.visible().await;

    if services.is_empty() {
        println!("{}", NO_SERVICES);
        return Ok(());
    }
    println!("{:<16} {:<24} {:<40} {}", "NAMESPACE", "NAME", "INTERNAL", "EXTERNAL");
    println!("{}", "-".repeat(110));
    for service in services {
        let internal: Vec<String> = service.internal.values().cloned().collect();
        let external: Vec<String> = service.external.values().cloned().collect();
        println!(
            "{:<16} {:<24} {:<40} {}",
            service.namespace,
            service.name,
            internal.join(" "),
            external.join(" ")
        );
    }
    Ok(())
}

/// Show the quota of a namespace
pub async fn quota(session: &Session, space: Option<String>) -> Result<()> {
    session
        .state
        .load_connection_state()
        .await
        .map_err(surface)?;
    if let Some(space) = &space {
        session.state.set_user_space(space).await;
    }

    let conn = session.state.connection().await;
    let name = conn.selected_user_space.unwrap_or_default();
    match conn.quota {
        Some(quota) => {
            println!("Quota of '{}':", name);
            print_meter("CPU", quota.cpu);
            print_meter("GPU", quota.gpu);
            print_meter("Memory", quota.memory);
        }
        None => println!("Namespace '{}' has no quota", name),
    }
    Ok(())
}

pub async fn set_quota(
    session: &Session,
    space: &str,
    cpu: Option<String>,
    gpu: Option<String>,
    memory: Option<String>,
) -> Result<()> {
    let limits = QuotaLimits { cpu, gpu, memory };
    session.state.set_quota(space, &limits).await.map_err(surface)?;
    println!("Quota of '{}' updated", space);
    Ok(())
}

pub async fn agent(session: &Session, pause: bool) -> Result<()> {
    let status = if pause {
        session.state.pause_agent().await
    } else {
        session.state.resume_agent().await
    }
    .map_err(surface)?;
    println!(
        "Agent {}",
        if status.agent_running { "running" } else { "paused" }
    );
    Ok(())
}

pub async fn update_repos(session: &Session) -> Result<()> {
    session
        .state
        .api()
        .update_repositories()
        .await
        .map_err(surface)?;
    println!("Template repositories updated");
    Ok(())
}

pub async fn theme(session: &Session, dark: bool) -> Result<()> {
    session.state.prefs().set_dark_mode(dark).await?;
    println!("Theme set to {}", if dark { "dark" } else { "light" });
    Ok(())
}

/// Set or clear the key the dashboard is locked with
pub async fn lock(session: &Session, key: Option<String>) -> Result<()> {
    let locked = key.is_some();
    session.state.prefs().set_access_key(key).await?;
    if locked {
        println!("Dashboard locked");
    } else {
        session.state.sign_out().await;
        println!("Dashboard unlocked");
    }
    Ok(())
}

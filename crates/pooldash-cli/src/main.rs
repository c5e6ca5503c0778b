//! pooldash CLI
//!
//! Terminal front end for a pool's management API.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use pooldash_core::{DashboardConfig, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// pooldash - inspect and operate a pool of compute devices and its jobs
#[derive(Parser, Debug)]
#[command(name = "pooldash")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Management API address
    #[arg(long, global = true)]
    api: Option<String>,

    /// Management API key
    #[arg(long, env = "POOLDASH_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Key this dashboard is locked with, if any
    #[arg(long, env = "POOLDASH_USER_KEY", global = true, hide_env_values = true)]
    user_key: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show connectivity and agent status
    Status,

    /// Show pool capacity and the job count
    Dashboard,

    /// Show resource usage over a time window
    Usage {
        /// Window: 24h, 3d, 7d or 15d
        #[arg(long)]
        range: Option<String>,

        /// Resource to chart: gpus or cpu
        #[arg(long, default_value = "gpus")]
        resource: String,

        /// Restrict to these devices (defaults to all)
        #[arg(long = "device")]
        devices: Vec<String>,
    },

    /// List pool devices with their GPUs and conditions
    Devices,

    /// Stop scheduling new work on a node
    Cordon { node: String },

    /// Allow scheduling on a node again
    Uncordon { node: String },

    /// Remove a node from the pool
    DeleteNode { node: String },

    /// Show the labels and resources of a node
    Labels { node: String },

    /// Add a label to a node
    Label {
        node: String,
        key: String,
        value: String,
    },

    /// List jobs
    Jobs {
        /// Only jobs in this namespace
        #[arg(long, conflicts_with = "all")]
        namespace: Option<String>,

        /// Jobs in every namespace
        #[arg(long)]
        all: bool,

        /// Page to show (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Show the spec and conditions of a job
    Job {
        name: String,

        /// Namespace the job lives in (defaults to every namespace)
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Search job names interactively, one query per line on stdin
    Search,

    /// List job templates, or show the parameters of one
    Templates {
        /// Template to describe
        name: Option<String>,
    },

    /// Deploy a job from a template
    Deploy {
        /// Template name
        #[arg(long)]
        template: String,

        /// Job name
        #[arg(long)]
        name: String,

        /// Template parameter, key=value
        #[arg(long = "param")]
        params: Vec<String>,

        /// Target node label, key=value
        #[arg(long = "target")]
        targets: Vec<String>,

        /// How target labels combine: and, or
        #[arg(long)]
        mode: Option<String>,

        /// Namespace to deploy into
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Delete jobs by name
    Delete {
        #[arg(required = true)]
        jobs: Vec<String>,

        /// Namespace the jobs live in (defaults to every namespace)
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Show the logs of a job
    Logs {
        job: String,

        /// Lines per pod
        #[arg(long)]
        tail: Option<u32>,

        /// Only this pod
        #[arg(long)]
        pod: Option<String>,

        /// Namespace the job lives in
        #[arg(long)]
        namespace: Option<String>,

        /// Keep polling every few seconds until interrupted
        #[arg(short, long)]
        follow: bool,

        /// Poll interval in seconds
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },

    /// Show the logs of the pool services
    ServiceLogs {
        #[arg(long)]
        tail: Option<u32>,
    },

    /// List pool services
    Services {
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Show the quota of a namespace (defaults to your own)
    Quota { space: Option<String> },

    /// Set the quota limits of a namespace
    SetQuota {
        space: String,

        #[arg(long)]
        cpu: Option<String>,

        #[arg(long)]
        gpu: Option<String>,

        #[arg(long)]
        memory: Option<String>,
    },

    /// Pause or resume the local agent
    Agent { action: AgentAction },

    /// Refresh the template repositories
    UpdateRepos,

    /// Set the color theme
    Theme { theme: Theme },

    /// Lock the dashboard with a key, or unlock it when no key is given
    Lock { key: Option<String> },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AgentAction {
    Pause,
    Resume,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Theme {
    Dark,
    Light,
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = if logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(api) = cli.api {
        config.api.base_url = api;
    }
    if let Some(key) = cli.api_key {
        config.api.api_key = Some(key);
    }

    init_logging(&config.logging, cli.verbose);

    let session = commands::Session::connect(&config).await?;

    // The theme can be changed while locked
    if !matches!(cli.command, Commands::Theme { .. }) {
        session.authorize(cli.user_key.as_deref()).await?;
    }

    match cli.command {
        Commands::Status => commands::status(&session).await?,
        Commands::Dashboard => commands::dashboard(&session).await?,
        Commands::Usage {
            range,
            resource,
            devices,
        } => commands::usage(&session, range, resource, devices).await?,
        Commands::Devices => commands::devices(&session).await?,
        Commands::Cordon { node } => commands::cordon(&session, &node, true).await?,
        Commands::Uncordon { node } => commands::cordon(&session, &node, false).await?,
        Commands::DeleteNode { node } => commands::delete_node(&session, &node).await?,
        Commands::Labels { node } => commands::labels(&session, &node).await?,
        Commands::Label { node, key, value } => {
            commands::label(&session, &node, &key, &value).await?
        }
        Commands::Jobs {
            namespace,
            all,
            page,
        } => commands::jobs(&session, namespace, all, page).await?,
        Commands::Job { name, namespace } => commands::job(&session, &name, namespace).await?,
        Commands::Search => commands::search(&session).await?,
        Commands::Templates { name } => commands::templates(&session, name).await?,
        Commands::Deploy {
            template,
            name,
            params,
            targets,
            mode,
            namespace,
        } => {
            let args = commands::DeployArgs {
                template,
                name,
                params,
                targets,
                mode,
                namespace,
            };
            commands::deploy(&session, args).await?
        }
        Commands::Delete { jobs, namespace } => commands::delete(&session, jobs, namespace).await?,
        Commands::Logs {
            job,
            tail,
            pod,
            namespace,
            follow,
            interval,
        } => {
            let args = commands::LogArgs {
                job,
                tail,
                pod,
                namespace,
                follow,
                interval,
            };
            commands::logs(&session, args).await?
        }
        Commands::ServiceLogs { tail } => commands::service_logs(&session, tail).await?,
        Commands::Services { namespace } => commands::services(&session, namespace).await?,
        Commands::Quota { space } => commands::quota(&session, space).await?,
        Commands::SetQuota {
            space,
            cpu,
            gpu,
            memory,
        } => commands::set_quota(&session, &space, cpu, gpu, memory).await?,
        Commands::Agent { action } => {
            commands::agent(&session, matches!(action, AgentAction::Pause)).await?
        }
        Commands::UpdateRepos => commands::update_repos(&session).await?,
        Commands::Theme { theme } => {
            commands::theme(&session, matches!(theme, Theme::Dark)).await?
        }
        Commands::Lock { key } => commands::lock(&session, key).await?,
    }

    Ok(())
}

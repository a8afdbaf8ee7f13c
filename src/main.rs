/// rosa-provisioner - STS cluster provisioning for OpenShift on AWS
///
/// Creates the IAM roles and OIDC provider a managed OpenShift cluster needs,
/// submits the cluster, waits for it, and undoes its own work on failure.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rosa_provisioner::config::ClusterConfig;
use rosa_provisioner::engine::{
    Orchestrator, Outcome, RunEvent, RunOutcome, RunReporter, TeardownOptions,
};
use rosa_provisioner::error::format_err_chain;
use rosa_provisioner::identity::IamBackend;
use rosa_provisioner::ocm::{ClusterService, OcmClient};
use rosa_provisioner::utils::TokioClock;

#[derive(Parser)]
#[command(name = "rosa-provisioner")]
#[command(about = "Provision managed OpenShift clusters on AWS with short-lived credentials", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "cluster.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show which identity resources exist and which would be created
    Plan,

    /// Create the identity resources and the cluster
    Create,

    /// Show cluster status
    Status,

    /// Update roles whose version tag does not match the cluster version
    UpgradeRoles {
        /// Apply the updates instead of only listing them
        #[arg(long)]
        yes: bool,
    },

    /// Delete the cluster and its operator roles
    Destroy {
        /// Also delete the account-wide roles (shared by other clusters)
        #[arg(long)]
        include_account_roles: bool,

        /// Leave the OIDC provider in place
        #[arg(long)]
        keep_oidc_provider: bool,
    },
}

/// Outcome of a command that did not fail outright
enum Completion {
    Success,
    Failed,
    /// Failed and left resources behind
    Leftovers,
}

impl From<Completion> for ExitCode {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Success => ExitCode::SUCCESS,
            Completion::Failed => ExitCode::from(1),
            Completion::Leftovers => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rosa_provisioner={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping and rolling back...");
            trigger.cancel();
        }
    });

    // Execute command
    let result = match cli.command {
        Commands::Init { force } => init_config(&cli, force).await,
        Commands::Plan => show_plan(&cli).await,
        Commands::Create => create_cluster(&cli, cancel).await,
        Commands::Status => show_status(&cli).await,
        Commands::UpgradeRoles { yes } => upgrade_roles(&cli, yes).await,
        Commands::Destroy {
            include_account_roles,
            keep_oidc_provider,
        } => {
            let options = TeardownOptions {
                include_account_roles,
                keep_oidc_provider,
            };
            destroy_cluster(&cli, options, cancel).await
        }
    };

    match result {
        Ok(completion) => completion.into(),
        Err(e) => {
            error!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Logs engine events as they happen
struct TracingReporter;

impl RunReporter for TracingReporter {
    fn report(&self, event: RunEvent) {
        match event {
            RunEvent::StateChanged { to, .. } => info!("==> {}", to),
            RunEvent::Planned {
                logical_name,
                status,
            } => info!("  {:<40} {:?}", logical_name, status),
            RunEvent::ResourceResolved {
                logical_name,
                arn,
                outcome,
            } => {
                let line = resolved_line(&logical_name, outcome, arn.as_deref());
                if outcome.is_resolved() {
                    info!("{}", line)
                } else {
                    error!("{}", line)
                }
            }
            RunEvent::ClusterAccepted { cluster_id } => {
                info!("Cluster accepted with ID {}", cluster_id)
            }
            RunEvent::ClusterPolled { cluster_id, state } => {
                info!("  cluster {} is {}", cluster_id, state)
            }
            RunEvent::ResourceDeleted { logical_name, arn } => {
                info!("  ✓ deleted {} ({})", logical_name, arn)
            }
            RunEvent::ResourceDeleteFailed {
                logical_name,
                arn,
                error,
            } => error!("  ✗ could not delete {} ({}): {}", logical_name, arn, error),
        }
    }
}

fn resolved_line(logical_name: &str, outcome: Outcome, arn: Option<&str>) -> String {
    let mark = if outcome.is_resolved() { "✓" } else { "✗" };
    format!("  {} {} {:?} {}", mark, logical_name, outcome, arn.unwrap_or(""))
        .trim_end()
        .to_string()
}

fn load_config(cli: &Cli) -> Result<ClusterConfig> {
    ClusterConfig::from_file(&cli.config).context("Failed to load configuration")
}

async fn build_orchestrator(config: &ClusterConfig) -> Result<Orchestrator> {
    let service = build_service(config)?;
    let identity = IamBackend::from_env(&config.cluster.region, config.aws.profile.as_deref())
        .await
        .context("Failed to initialize AWS credentials")?;
    info!("Using AWS account {}", identity.account_id());

    Ok(Orchestrator::new(
        Arc::new(identity),
        service,
        Arc::new(TokioClock),
        Arc::new(TracingReporter),
        config.engine.clone(),
        config.limits.clone(),
    ))
}

fn build_service(config: &ClusterConfig) -> Result<Arc<dyn ClusterService>> {
    let token = config.get_ocm_token()?;
    let client: Arc<dyn ClusterService> =
        Arc::new(OcmClient::new(&config.ocm.url, &config.ocm.token_url, token)?);
    Ok(client)
}

/// Initialize example configuration file
async fn init_config(cli: &Cli, force: bool) -> Result<Completion> {
    if cli.config.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = ClusterConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the configuration file, in particular identity.oidc");
    info!("  2. Set your OpenShift Cluster Manager offline token:");
    info!("     export OCM_TOKEN=your-token-here");
    info!("  3. Review what will be created:");
    info!("     rosa-provisioner plan");
    info!("  4. Create the cluster:");
    info!("     rosa-provisioner create");

    Ok(Completion::Success)
}

/// Show the identity plan without changing anything
async fn show_plan(cli: &Cli) -> Result<Completion> {
    let config = load_config(cli)?;
    let orchestrator = build_orchestrator(&config).await?;

    let plan = orchestrator
        .plan(&config.cluster)
        .await
        .map_err(|e| anyhow::anyhow!(format_err_chain(&e)))?;

    info!("Cluster: {}", config.cluster.name);
    if plan.is_empty() {
        info!("No identity resources required (direct credentials mode)");
        return Ok(Completion::Success);
    }
    for entry in plan.entries() {
        info!(
            "  {:<40} {:<16} {:?}",
            entry.logical_name(),
            entry.resource.name,
            entry.status
        );
    }
    info!("Summary: {:?}", plan.summary());

    Ok(Completion::Success)
}

/// Create the identity resources and the cluster
async fn create_cluster(cli: &Cli, cancel: CancellationToken) -> Result<Completion> {
    info!("Starting cluster creation...");

    let config = load_config(cli)?;
    info!("Cluster name: {}", config.cluster.name);

    let orchestrator = build_orchestrator(&config).await?;
    let outcome = orchestrator.run(&config.cluster, cancel).await;
    let leftovers = outcome.rollback_error();

    match outcome {
        RunOutcome::Done { cluster, resources } => {
            info!("");
            info!("✓ Cluster {} is ready ({})", cluster.name, cluster.id);
            if let Some(api) = &cluster.api_url {
                info!("  API:     {}", api);
            }
            if let Some(console) = &cluster.console_url {
                info!("  Console: {}", console);
            }
            let created = resources.iter().filter(|r| r.owned).count();
            info!(
                "  Identity resources: {} created, {} reused",
                created,
                resources.len() - created
            );
            Ok(Completion::Success)
        }
        RunOutcome::Failed {
            error, failed_in, ..
        } => {
            error!("Cluster creation failed while {}: {}", failed_in, format_err_chain(&error));
            match leftovers {
                Some(incomplete) => {
                    error!("{}", incomplete);
                    Ok(Completion::Leftovers)
                }
                None => {
                    info!("Rollback complete, nothing was left behind");
                    Ok(Completion::Failed)
                }
            }
        }
    }
}

/// Show cluster status
async fn show_status(cli: &Cli) -> Result<Completion> {
    let config = load_config(cli)?;
    let service = build_service(&config)?;

    let Some(cluster) = service
        .find_cluster(&config.cluster.name)
        .await
        .context("Failed to look up cluster")?
    else {
        info!("No cluster found with name: {}", config.cluster.name);
        return Ok(Completion::Success);
    };

    info!("Cluster: {} (ID: {})", cluster.name, cluster.id);
    info!("  State:   {}", cluster.state);
    info!("  API:     {}", cluster.api_url.as_deref().unwrap_or("N/A"));
    info!("  Console: {}", cluster.console_url.as_deref().unwrap_or("N/A"));
    match (cluster.compute_nodes, cluster.autoscale) {
        (_, Some(scaling)) => info!(
            "  Workers: autoscaling {}-{}",
            scaling.min_replicas, scaling.max_replicas
        ),
        (Some(nodes), None) => info!("  Workers: {}", nodes),
        (None, None) => info!("  Workers: N/A"),
    }

    Ok(Completion::Success)
}

/// List or apply role version upgrades
async fn upgrade_roles(cli: &Cli, yes: bool) -> Result<Completion> {
    let config = load_config(cli)?;
    let orchestrator = build_orchestrator(&config).await?;

    let plan = orchestrator
        .plan(&config.cluster)
        .await
        .map_err(|e| anyhow::anyhow!(format_err_chain(&e)))?;
    let mismatched = plan.mismatched();
    if mismatched.is_empty() {
        info!("All roles already match version {}", config.cluster.role_version());
        return Ok(Completion::Success);
    }

    for entry in &mismatched {
        info!(
            "  {} is at {}, needs {}",
            entry.resource.name,
            entry.found_version().unwrap_or("?"),
            entry.wanted_version.as_deref().unwrap_or("?")
        );
    }
    if !yes {
        info!("Re-run with --yes to update these roles");
        return Ok(Completion::Failed);
    }

    let upgraded = orchestrator
        .upgrade_roles(&config.cluster, true)
        .await
        .map_err(|e| anyhow::anyhow!(format_err_chain(&e)))?;
    info!("✓ {} roles updated", upgraded.len());

    Ok(Completion::Success)
}

/// Destroy an existing cluster
async fn destroy_cluster(
    cli: &Cli,
    options: TeardownOptions,
    cancel: CancellationToken,
) -> Result<Completion> {
    info!("Starting cluster destruction...");

    let config = load_config(cli)?;
    info!("Cluster name: {}", config.cluster.name);

    let orchestrator = build_orchestrator(&config).await?;
    let report = orchestrator
        .destroy(&config.cluster, options, &cancel)
        .await
        .map_err(|e| anyhow::anyhow!(format_err_chain(&e)))?;

    for arn in &report.kept {
        info!("  kept {}", arn);
    }
    if !report.is_complete() {
        for failure in &report.failed {
            error!("  ✗ {} ({}): {}", failure.logical_name, failure.arn, failure.error);
        }
        error!("Teardown incomplete, the resources above need manual cleanup");
        return Ok(Completion::Leftovers);
    }

    info!("✓ Cluster destroyed successfully");
    Ok(Completion::Success)
}

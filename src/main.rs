//! knmstate policy controller - aggregates per-node enactments into policy status

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use knmstate::controller::{self, ControllerConfig};
use knmstate::node::KubeNodeInventory;
use knmstate::policy::{KubePolicyStore, PolicyConditionsUpdater};
use knmstate::retry::RetryConfig;
use knmstate::{DEFAULT_HANDLER_SELECTOR, FIELD_MANAGER};

/// Cluster-wide status for NodeNetworkConfigurationPolicies
#[derive(Parser, Debug)]
#[command(name = "knmstate-controller", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests (all served versions) and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON
    #[arg(long, env = "NNCP_LOG_JSON", global = true)]
    log_json: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct Settings {
    /// Label selector for handler pods; their nodes are the eligible nodes
    #[arg(
        long,
        env = "NNCP_HANDLER_SELECTOR",
        default_value = DEFAULT_HANDLER_SELECTOR,
        global = true
    )]
    handler_selector: String,

    /// Attempts per status update before giving up on conflicts
    #[arg(
        long,
        env = "NNCP_CONFLICT_ATTEMPTS",
        default_value = "5",
        global = true
    )]
    conflict_attempts: u32,

    /// Base delay between conflicting attempts, in milliseconds
    #[arg(
        long,
        env = "NNCP_CONFLICT_DELAY_MS",
        default_value = "10",
        global = true
    )]
    conflict_delay_ms: u64,

    /// Seconds between periodic resyncs of every policy
    #[arg(long, env = "NNCP_RESYNC_SECS", default_value = "300", global = true)]
    resync_secs: u64,
}

impl Settings {
    fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.conflict_attempts,
            initial_delay: Duration::from_millis(self.conflict_delay_ms),
            ..RetryConfig::default()
        }
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            handler_selector: self.handler_selector.clone(),
            retry: self.retry(),
            resync_interval: Duration::from_secs(self.resync_secs),
            ..ControllerConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch policies and enactments and keep policy status current (default)
    Controller,

    /// Recompute one policy's status once and exit
    Update {
        /// Policy name
        policy: String,
    },

    /// Clear one policy's status conditions and exit
    Reset {
        /// Policy name
        policy: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    if cli.crd {
        println!("{}", knmstate::crd::crds_yaml()?);
        return Ok(());
    }

    let client = Client::try_default().await?;

    match cli.command {
        Some(Commands::Controller) | None => {
            controller::run(client, cli.settings.controller_config()).await?;
        }
        Some(Commands::Update { policy }) => {
            let updater = one_shot_updater(client, &cli.settings);
            updater.update(&policy).await?;
            tracing::info!(%policy, "policy conditions updated");
        }
        Some(Commands::Reset { policy }) => {
            let updater = one_shot_updater(client, &cli.settings);
            updater.reset(&policy).await?;
            tracing::info!(%policy, "policy conditions reset");
        }
    }

    Ok(())
}

fn one_shot_updater(client: Client, settings: &Settings) -> PolicyConditionsUpdater {
    PolicyConditionsUpdater::new(
        Arc::new(KubePolicyStore::new(client.clone(), FIELD_MANAGER)),
        Arc::new(KubeNodeInventory::new(client, &settings.handler_selector)),
    )
    .with_retry(settings.retry())
}

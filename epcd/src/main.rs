//! Environment Promotion Controller - Daemon
//!
//! The daemon reconciles every Environment in the object store: it polls
//! subscriptions, records available states, and drives auto-promotion.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use epc_common::{ControllerConfig, EventBus, StaticCredentialsStore};
use epcd::fetchers::{ChartVersionFetcher, GitCommitFetcher, ImageTagFetcher};
use epcd::health::ArgoCdHealthChecker;
use epcd::promote::MechanismChain;
use epcd::reconciler::EnvironmentReconciler;
use epcd::registry::{ChartIndexClient, RegistryClient};
use epcd::scheduler::{Scheduler, SchedulerConfig};
use epcd::state::RemoteStateSource;
use epcd::store::{InMemoryObjectStore, ObjectStore, StoreSeed};

#[derive(Parser)]
#[command(name = "epcd")]
#[command(author, version, about = "EPC daemon - GitOps environment promotion")]
struct Cli {
    /// Path to controller configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interval between reconcile ticks (overrides config)
    #[arg(short, long)]
    poll_interval: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Starting EPC daemon...");

    let mut config = ControllerConfig::load(cli.config.as_deref())?;
    if let Some(interval) = cli.poll_interval {
        config.poll_interval = interval;
    }
    let poll_interval = config.poll_interval();

    // Seed the object store with declared Environments and Applications.
    let seed = match &config.environments_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<StoreSeed>(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => StoreSeed::default(),
    };
    info!(
        "Loaded {} environments and {} applications",
        seed.environments.len(),
        seed.applications.len()
    );
    let store = InMemoryObjectStore::seeded(seed).await;
    let store: Arc<dyn ObjectStore> = store;

    // Production wiring: remote-backed fetchers and mechanisms.
    let credentials = Arc::new(StaticCredentialsStore::new(config.credentials.clone()));
    let state_source = Arc::new(RemoteStateSource::new(
        Arc::new(GitCommitFetcher::new(credentials.clone())),
        Arc::new(ImageTagFetcher::new(
            credentials.clone(),
            RegistryClient::new(),
        )),
        Arc::new(ChartVersionFetcher::new(
            credentials.clone(),
            ChartIndexClient::new(),
        )),
        store.clone(),
    ));
    let promoter = Arc::new(MechanismChain::new(
        credentials,
        store.clone(),
        config.committer.clone(),
    ));
    let health_checker = Arc::new(ArgoCdHealthChecker::new(store.clone()));
    let reconciler = Arc::new(EnvironmentReconciler::new(
        state_source,
        promoter,
        health_checker,
    ));

    let scheduler = Arc::new(Scheduler::new(
        store,
        reconciler,
        EventBus::default(),
        SchedulerConfig { poll_interval },
    ));
    let handle = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    scheduler.stop().await;
    handle.abort();

    Ok(())
}

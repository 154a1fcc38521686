use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wowza_orchestrator::audit::TracingAuditSink;
use wowza_orchestrator::config::{Config, DEFAULT_CONFIG_PATH};
use wowza_orchestrator::remote::SshExecutor;
use wowza_orchestrator::state::{AppState, Inventory};
use wowza_orchestrator::{app, Orchestrator};

#[derive(Parser)]
#[command(name = "wowza-orchestrator", version, about = "Provisions Wowza streaming applications over ssh")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    let overrides = config.apply_env_overrides()?;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    for (setting, value) in &overrides {
        tracing::info!("Overriding {} from environment: {}", setting, value);
    }
    config.validate().context("invalid configuration")?;

    let inventory = Arc::new(Inventory::from_config(&config));
    let executor = Arc::new(SshExecutor::new(&config.ssh));
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        executor,
        inventory.clone(),
        inventory.clone(),
    ));
    tracing::info!(
        "Loaded {} servers ({} active), {} account names",
        config.servers.len(),
        inventory.active_server_count(),
        inventory.account_name_count()
    );

    let state = Arc::new(AppState::new(inventory, orchestrator, Arc::new(TracingAuditSink)));
    let router = app::build_router(state);

    let addr = config.daemon.listen_addr;
    tracing::info!("Orchestrator listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}

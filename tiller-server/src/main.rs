// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tiller — control-plane registry for an IPVS load balancer
//
//  Store:     flat-file or in-memory service registry
//  Balancer:  ipvsadm (kernel IPVS) or in-process driver
//  API:       axum over rustls, per-service locking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Context;
use axum_server::Handle;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tiller_admin::server::AdminState;
use tiller_core::TillerConfig;
use tiller_observability::MetricsCollector;
use tiller_sync::Registry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tiller", version, about = "Tiller — IPVS control-plane registry")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/tiller/tiller.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Tiller starting");

    // ── Config ──
    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        TillerConfig::load(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?
    } else {
        info!("No config file found, using defaults");
        TillerConfig::default()
    };

    // ── Store + balancer ──
    let store = tiller_store::open(&config.store).context("failed to open store")?;
    let balancer = tiller_sync::driver::from_config(&config.balancer);
    let registry = Arc::new(Registry::new(store, balancer));

    // ── Metrics ──
    let metrics = Arc::new(MetricsCollector::new(config.observability.prometheus.enabled)?);

    let state = Arc::new(AdminState {
        registry,
        metrics,
        token: config.admin.token.clone().filter(|t| !t.is_empty()),
        metrics_path: config.observability.prometheus.path.clone(),
    });
    state.observe_store();
    if state.token.is_none() {
        tracing::warn!("admin.token is not set; the Registry API accepts unauthenticated requests");
    }

    // ── Shutdown on SIGINT / SIGTERM ──
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    info!(
        addr = %config.admin.addr,
        store = state.registry.store().kind(),
        balancer = state.registry.balancer_name(),
        "Tiller is ready"
    );
    tiller_admin::server::start_admin(config.admin.clone(), state, handle).await?;

    info!("Tiller stopped");
    Ok(())
}

async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relaycore::config::Config;
use relaycore::download::DownloadJobManager;
use relaycore::http::ClientFactory;
use relaycore::remote::auth::StaticServiceLocator;
use relaycore::server::{self, AppState};
use relaycore::service::ServiceRegistry;
use relaycore::services::CircuitBreakerPool;
use relaycore::session::LocalSessionCache;
use sandboxed_file_manager::{CleanupPolicy, SandboxedManager, TimeMatch};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relayd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Remote-capable media service execution engine")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Listening IP address (overrides config file)
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("relaycore={}", cli.log_level).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting relayd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!(config_file = %cli.config, "configuration loaded");

    if let Some(host) = cli.host {
        config.serve.host = host;
    }
    if let Some(port) = cli.port {
        config.serve.port = port;
    }

    let config = Arc::new(config);

    let breaker_pool = Arc::new(CircuitBreakerPool::new(config.circuitbreaker.clone().unwrap_or_default()));
    let client_factory = Arc::new(ClientFactory::new(config.clone(), breaker_pool));

    let registry = Arc::new(ServiceRegistry::new());
    let discovered = registry.discover_remote(&config.remote_services, &client_factory).await?;
    info!(discovered, "remote service discovery complete");

    // No per-service adapters ship with this engine; adapters register
    // themselves with a real locator when they're plugged in.
    let locator = Arc::new(StaticServiceLocator::new(HashMap::new()));

    let download_work_dirs = SandboxedManager::builder()
        .base_directory(config.directories.temp.clone())
        .cleanup_policy(CleanupPolicy::new().remove_after(config.downloader.timeout * 4).time_match(TimeMatch::Modified))
        .cleanup_interval(std::time::Duration::from_secs(3600))
        .build()
        .await?;
    let jobs = Arc::new(DownloadJobManager::new(config.downloader.downloads as usize, download_work_dirs));

    let session_cache = Arc::new(
        LocalSessionCache::open(config.directories.cache.clone())
            .await
            .context("failed to open local session cache")?,
    );

    let state = AppState { config: config.clone(), registry, locator, client_factory, jobs, session_cache };
    let app = server::build_router(state);

    let bind_addr = format!("{}:{}", config.serve.host, config.serve.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(address = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("relayd shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

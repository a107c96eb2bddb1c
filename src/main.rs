//! OwnGPT model manager - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use owngpt::{
    ChatRelay, DockerDriver, HttpReadinessProbe, LifecycleSettings, ModelManager, ModelState,
    OllamaClient, api, config::ManagerConfig, metrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "owngpt")]
#[command(about = "Ollama model container manager and chat relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    tracing::info!("Starting OwnGPT model manager");

    // Load configuration
    let mut config = ManagerConfig::load(cli.config)?;

    // CLI overrides
    if let Some(port) = cli.port {
        config.api_port = port;
    }

    config.validate()?;

    tracing::info!(
        api_port = config.api_port,
        models_dir = ?config.models_dir,
        network = ?config.docker_network,
        publish_before_ready = config.publish_before_ready,
        "Configuration loaded"
    );

    match owngpt::gpu::detect_gpus().await {
        Some(gpus) => tracing::info!(count = gpus.count(), indices = ?gpus.indices, "GPUs detected"),
        None => tracing::info!("No GPUs detected, models will run on CPU"),
    }

    // Setup metrics
    let prometheus_handle = metrics::setup_metrics()?;

    let state = Arc::new(ModelState::new());

    let manager = Arc::new(ModelManager::new(
        state.clone(),
        Arc::new(DockerDriver::from_config(&config)),
        Arc::new(HttpReadinessProbe::from_config(&config)),
        LifecycleSettings::from_config(&config),
    ));

    let relay = Arc::new(ChatRelay::new(
        state.clone(),
        Arc::new(OllamaClient::from_config(&config)),
    ));

    // Adopt a container left running by a previous process
    if config.resync_on_startup {
        match manager.resync().await {
            Ok(Some(model)) => {
                tracing::info!(container = %model.unit_name, "Adopted running model")
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read existing containers"),
        }
    }

    // Setup API
    let app_state = api::AppState {
        manager,
        relay,
        prometheus_handle,
    };

    let app = api::create_router(app_state, &config.cors_allowed_origins);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown. Model containers are left running so the next
    // start can adopt them.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}

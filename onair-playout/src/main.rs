//! onair-playout service
//!
//! Runs the playout engine with clock-driven devices, the probe loader and
//! the gesture relay host, behind the HTTP/SSE control surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use onair_common::config::{locate_config_file, resolve_root_folder};
use onair_playout::api::{self, AppContext};
use onair_playout::device::{ClockDeviceFactory, GestureRelay, ProbeLoader};
use onair_playout::metadata::MetadataClient;
use onair_playout::notify::TracingNotifier;
use onair_playout::{PlayoutEngine, TomlConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_FILE_NAME: &str = "playout.toml";

#[derive(Parser, Debug)]
#[command(name = "onair-playout")]
#[command(about = "Multi-channel on-air playout engine")]
#[command(version)]
struct Args {
    /// HTTP port (overrides the config file)
    #[arg(short, long, env = "ONAIR_PLAYOUT_PORT")]
    port: Option<u16>,

    /// Root folder for relative track paths
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Path to the TOML config file
    #[arg(short, long, env = "ONAIR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = locate_config_file(args.config.as_deref(), CONFIG_FILE_NAME)
        .context("Failed to locate config file")?;
    let config = match &config_path {
        Some(path) => TomlConfig::load(path).context("Failed to load config")?,
        None => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("onair_playout={},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No {} found, using built-in defaults", CONFIG_FILE_NAME),
    }

    let settings = config
        .engine_settings()
        .context("Invalid playout configuration")?;
    let port = args.port.unwrap_or(config.port);
    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        "ONAIR_ROOT_FOLDER",
        config.root_folder.as_deref(),
    );

    info!("Starting onair-playout on port {}", port);
    let loader = Arc::new(ProbeLoader::new(root_folder));
    info!("Root folder: {}", loader.root_folder().display());

    let gestures = Arc::new(GestureRelay::new());
    let devices = ClockDeviceFactory::new(
        config.tick_interval(),
        config.host.autoplay_allowed,
        Arc::clone(&gestures),
    );
    let engine = PlayoutEngine::new(
        settings,
        &devices,
        loader,
        gestures.clone(),
        Arc::new(TracingNotifier),
    );

    let metadata = match &config.metadata {
        Some(metadata) => {
            let client = MetadataClient::new(metadata).context("Failed to create metadata client")?;
            info!("Metadata API: {}", client.base_url());
            Some(Arc::new(client))
        }
        None => None,
    };

    let ctx = AppContext {
        engine,
        gestures,
        metadata,
    };

    api::run(port, ctx, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

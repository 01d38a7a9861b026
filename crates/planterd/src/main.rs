use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use planterd::Config;
use planterd::Engine;
use planterd::MemoryStore;
use planterd::api;
use planterd::config::LoggingConfig;
use planterd::store::Store;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Control panel daemon for the smart planter
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "planterd.toml")]
    config: PathBuf,

    /// Use an in-process store instead of the configured database
    #[arg(long)]
    memory: bool,
}

// The page model is single threaded; so is the daemon.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::from_file(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else if args.memory {
        Config::default()
    } else {
        anyhow::bail!("Config file {} not found", args.config.display());
    };

    init_logging(&config.logging);

    tracing::info!("planterd starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let store = open_store(&config, args.memory)?;

    let mut engine = Engine::new(store, &config);
    engine.start().await;
    let handle = engine.handle();
    let engine_task = tokio::spawn(engine.run());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = if config.api.enabled {
        let listen = config.api.listen.clone();
        let port = config.api.port;
        let handle = handle.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(listen, port, handle, shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        }))
    } else {
        tracing::info!("HTTP API disabled");
        None
    };

    tracing::info!("Panel ready, press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    // The server may already have exited on its own.
    let _ = shutdown_tx.send(());
    if let Some(task) = api_task {
        task.await.context("HTTP API task panicked")?;
    }

    if let Err(e) = handle.shutdown().await {
        tracing::warn!("Engine already stopped: {}", e);
    }
    engine_task.await.context("Engine task panicked")?;

    tracing::info!("planterd shutdown complete");

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = Targets::new()
        .with_default(LevelFilter::from(logging.level))
        .with_targets(
            logging
                .overrides
                .iter()
                .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
        );

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

fn open_store(config: &Config, memory: bool) -> anyhow::Result<Arc<dyn Store>> {
    if memory {
        tracing::info!("Using in-process store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let url = config
        .store
        .url
        .as_deref()
        .context("store.url is required unless --memory is given")?;
    open_remote(url, config)
}

#[cfg(feature = "store_firebase")]
fn open_remote(url: &str, config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    tracing::info!("Connecting to realtime database at {}", url);
    let store = planterd::store::FirebaseStore::new(url, config.store.timeout())
        .context("Failed to create database client")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "store_firebase"))]
fn open_remote(url: &str, _config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    anyhow::bail!(
        "Cannot connect to {}: built without the store_firebase feature",
        url
    )
}

//! Tributary indexer
//!
//! Streams the Tributary program's logs, backfills gaps through periodic
//! catchup, and publishes decoded events to Kafka.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tributary_chain::{EventSchema, Idl, SolanaChainClient};
use tributary_indexer::store::RedisStore;
use tributary_indexer::{IndexerConfig, IndexerService, RestProxyBus, ServiceSettings};

#[derive(Parser)]
#[command(name = "tributary-indexer")]
#[command(about = "Tributary chain event producer")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "indexer.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode (validate config and exit)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = IndexerConfig::load(Some(cli.config.as_path())).context("invalid configuration")?;
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    init_logging(&config);

    let program_id = config.program_pubkey()?;
    info!("Starting Tributary indexer");
    info!("Program ID: {}", program_id);
    info!("RPC endpoint: {}", config.solana_api);
    info!("Topic prefix: {}", config.kafka_topic_prefix);

    let idl = Idl::from_file(&config.program_idl)
        .with_context(|| format!("failed to load program IDL from {}", config.program_idl))?;

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    let client = SolanaChainClient::new(&config.solana_api, program_id, idl, config.commitment_config()?);
    let schema: Arc<dyn EventSchema> = client.event_schema();

    let store = RedisStore::new(&config.redis_url, config.signature_ttl(), config.redis_timeout())?;
    if !store.connect().await {
        warn!("Redis unavailable at startup; dedup checks fail open until it is reachable");
    }
    let bus = RestProxyBus::new(&config.kafka_bootstrap_servers, config.bus_timeout())?;

    let service = IndexerService::new(
        Arc::new(client),
        schema,
        Arc::new(store),
        Arc::new(bus),
        ServiceSettings::from(&config),
    );
    service.initialize().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        shutdown_tx.send_replace(true);
    });

    info!("Indexer started successfully. Press Ctrl+C to shutdown.");
    match service.run(shutdown_rx).await {
        Ok(()) => {
            info!("Shutting down Tributary indexer");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Indexer stopped with an error");
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_logging(config: &IndexerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "tributary_indexer={level},tributary_chain={level}",
            level = config.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

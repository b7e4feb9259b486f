use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tributary_chain::{load_keypair, Idl, SolanaChainClient};
use tributary_scheduler::{CronTrigger, PaymentScheduler, SchedulerConfig};

#[derive(Parser, Debug)]
#[command(name = "tributary-scheduler")]
#[command(about = "Tributary recurring payment scheduler")]
struct Args {
    /// Path to scheduler configuration file
    #[arg(short, long, default_value = "scheduler.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode - find due payments but don't submit them
    #[arg(long)]
    dry_run: bool,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SchedulerConfig::load(Some(args.config.as_path())).context("invalid configuration")?;
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }
    config.dry_run |= args.dry_run;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("tributary_scheduler={level},tributary_chain={level}", level = config.log_level).into()
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tributary payment scheduler");
    if config.dry_run {
        warn!("Running in DRY RUN mode - no payments will be submitted");
    }

    let keypair = load_keypair(&config.anchor_wallet)?;
    let idl = Idl::from_file(&config.program_idl)
        .with_context(|| format!("failed to load program IDL from {}", config.program_idl))?;
    let program_id = config.program_pubkey()?;

    let client = SolanaChainClient::new(&config.solana_api, program_id, idl, config.commitment_config()?)
        .with_signer(keypair);
    let gateway = client
        .signer_pubkey()
        .context("gateway keypair was not attached")?;

    info!("Gateway: {}", gateway);
    info!("Connection: {}", config.solana_api);

    let scheduler = Arc::new(
        PaymentScheduler::new(Arc::new(client), gateway)
            .with_payment_delay(config.payment_delay())
            .with_dry_run(config.dry_run),
    );

    if args.once {
        let summary = scheduler.run_once().await?;
        info!(?summary, "Single run finished");
        return Ok(());
    }

    let trigger = CronTrigger::new(&config.cron_schedule)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, shutting down gracefully...");
        shutdown_tx.send_replace(true);
    });

    trigger.run(scheduler, shutdown_rx).await;
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

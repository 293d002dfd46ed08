// gateway/src/main.rs
//! Crosslock Relay Gateway
//!
//! FOCUSED RESPONSIBILITIES:
//! 1. Dispatch ledger order events to destination-chain bridges
//! 2. Track dispatched transactions to the confirmation threshold
//! 3. Retry failed dispatches with bounded exponential backoff
//! 4. Ingest oracle price updates
//!
//! NOT RESPONSIBLE FOR:
//! - Order/HTLC state transitions (the ledger owns those)
//! - Bitcoin-side script construction or monitoring

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bridge;
mod config;
mod database;
mod metrics;

use bridge::Dispatcher;
use config::GatewayConfig;
use database::Database;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, value_parser, default_value = "config.toml")]
    config: PathBuf,

    #[clap(short, long)]
    verbose: bool,

    #[clap(short, long, default_value = "sqlite:gateway.db")]
    database: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    info!(
        "Starting Crosslock Relay Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Configuration file: {:?}", args.config);

    let config = GatewayConfig::load(&args.config).context("Failed to load configuration")?;
    info!(
        "Configuration loaded: {} bridges, {} oracles",
        config.bridges.len(),
        config.oracles.len()
    );

    let db = Database::new(&args.database)
        .await
        .context("Failed to initialize database")?;

    let dispatcher = Arc::new(RwLock::new(Dispatcher::new(
        config.bridges.clone(),
        config.oracles.clone(),
        config.retry.clone(),
        config.confirmation_threshold,
    )));
    info!("Dispatcher initialized");

    let gateway = Gateway {
        config,
        db,
        dispatcher,
    };

    tokio::select! {
        result = gateway.run() => {
            if let Err(e) = result {
                error!("Gateway error: {}", e);
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, stopping gateway...");
        }
    }

    info!("Gateway stopped gracefully");
    Ok(())
}

struct Gateway {
    config: GatewayConfig,
    db: Database,
    dispatcher: Arc<RwLock<Dispatcher>>,
}

impl Gateway {
    async fn run(self) -> Result<()> {
        info!("Starting gateway main loop");

        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(self.config.poll_interval));

        let mut tick_count = 0u64;

        loop {
            interval.tick().await;
            tick_count += 1;

            if tick_count % 10 == 0 {
                info!("Gateway tick #{}", tick_count);
            }

            if let Err(e) = self.sweep_failed().await {
                error!("Error sweeping failed transactions: {}", e);
            }

            if tick_count % 6 == 0 {
                self.update_metrics().await;
            }
        }
    }

    /// Re-dispatch failed transactions that still have retries left
    async fn sweep_failed(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let failed: Vec<(u64, u64)> = {
            let dispatcher = self.dispatcher.read().await;
            dispatcher
                .failed_transactions()
                .iter()
                .map(|tx| (tx.nonce, tx.gas_price))
                .collect()
        };

        for (nonce, gas_price) in failed {
            let mut dispatcher = self.dispatcher.write().await;
            match dispatcher.retry_transaction(nonce, gas_price, now) {
                Ok((new_nonce, delay)) => {
                    info!(
                        "queued retry of nonce {} as {} after {}s",
                        nonce, new_nonce, delay
                    );
                    if let Some(tx) = dispatcher.transaction(new_nonce) {
                        self.db.store_transaction(tx).await?;
                    }
                    metrics::RETRIES_TOTAL.inc();
                }
                Err(e) if e.is_retryable() => {
                    error!("transient failure retrying nonce {}: {}", nonce, e);
                }
                Err(e) => {
                    // Exhausted or otherwise terminal: the HTLC timelock is
                    // the recovery path from here
                    error!("giving up on nonce {}: {}", nonce, e);
                }
            }
        }

        Ok(())
    }

    async fn update_metrics(&self) {
        let (pending, confirmed, failed) = self.dispatcher.read().await.counts();
        metrics::DISPATCHED_TOTAL.set((pending + confirmed + failed) as i64);
        metrics::CONFIRMED_TOTAL.set(confirmed as i64);
        metrics::FAILED_TOTAL.set(failed as i64);
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("crosslock_gateway={},sqlx=warn", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

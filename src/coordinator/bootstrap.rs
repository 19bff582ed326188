//! Daemon bootstrap: wires capabilities and the orchestrator from config
//!
//! A capability that cannot be initialised (missing key, bad URL) is logged
//! and left out; the jobs that need it are not scheduled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::coordination::wait_for_shutdown_signal;
use crate::error::Result;
use crate::exchange::{ChangeNowClient, ExchangeBroker};
use crate::market::{CryptoCompareClient, MarketDataSource};
use crate::persistence::{LocalObjectStore, ObjectStore};
use crate::services::ApiServer;
use crate::wallet::{EthereumWallet, Wallet, WavesNodeWallet};

use super::orchestrator::{Capabilities, Orchestrator};

/// Extra time granted to running trade cycles beyond the confirmation wait
const DRAIN_GRACE: Duration = Duration::from_secs(30);

pub fn build_capabilities(config: &AppConfig) -> Capabilities {
    let market = match CryptoCompareClient::new(&config.market) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn MarketDataSource>),
        Err(e) => {
            error!("Market data source disabled: {}", e);
            None
        }
    };

    let broker = match ChangeNowClient::new(&config.broker) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn ExchangeBroker>),
        Err(e) => {
            error!("Exchange broker disabled: {}", e);
            None
        }
    };

    let mut wallets: Vec<Arc<dyn Wallet>> = Vec::new();
    match &config.wallets.ethereum {
        Some(eth) => match EthereumWallet::new(eth) {
            Ok(wallet) => {
                info!(address = %wallet.address(), "ETH wallet ready");
                wallets.push(Arc::new(wallet));
            }
            Err(e) => error!("ETH wallet disabled: {}", e),
        },
        None => warn!("No ETH wallet configured"),
    }
    match &config.wallets.waves {
        Some(waves) => match WavesNodeWallet::new(waves) {
            Ok(wallet) => {
                info!(address = %wallet.address(), "WAVES wallet ready");
                wallets.push(Arc::new(wallet));
            }
            Err(e) => error!("WAVES wallet disabled: {}", e),
        },
        None => warn!("No WAVES wallet configured"),
    }

    Capabilities {
        market,
        broker,
        wallets,
    }
}

pub fn build_orchestrator(config: AppConfig) -> Orchestrator {
    let capabilities = build_capabilities(&config);
    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.storage.root));
    info!(root = %config.storage.root.display(), "Using local storage");
    Orchestrator::new(config, store, capabilities)
}

/// Warm up, schedule every job and run until SIGINT/SIGTERM
pub async fn run_daemon(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let config = orchestrator.config().clone();
    info!(
        environment = %config.environment,
        pairs = config.trading.pairs.len(),
        "Starting swapd"
    );
    if !config.is_production() {
        warn!("Not in production: decisions are logged, no exchange is executed");
    }

    // Transfers left by a previous run are settled before anything new starts.
    for (pair, outcome) in orchestrator.resume_all_pending().await {
        info!(pair = %pair, "Resumed at startup: {:?}", outcome);
    }
    if let Err(e) = orchestrator.refresh_datasets().await {
        warn!("Initial dataset refresh failed: {}", e);
    }
    if let Err(e) = orchestrator.retrain().await {
        warn!("Initial training incomplete: {}", e);
    }

    orchestrator.start();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let api = config.api.port.map(|port| {
        let mut rx = shutdown_tx.subscribe();
        let server = ApiServer::new(orchestrator.clone(), port);
        tokio::spawn(async move {
            server
                .run(async move {
                    let _ = rx.recv().await;
                })
                .await
        })
    });

    let signal = wait_for_shutdown_signal().await;
    info!("Received {}, shutting down", signal);

    let _ = shutdown_tx.send(());
    let drain = Duration::from_secs(config.saga.confirm_timeout_secs) + DRAIN_GRACE;
    orchestrator.shutdown(drain).await;

    if let Some(handle) = api {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("API server error: {}", e),
            Err(e) => error!("API server task failed: {}", e),
        }
    }
    Ok(())
}

mod common;

use common::{candles, config, FakeBroker, FakeMarket, FakeWallet};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use swapd::coordinator::{Capabilities, Orchestrator};
use swapd::domain::Coin;
use swapd::exchange::ExchangeBroker;
use swapd::market::MarketDataSource;
use swapd::persistence::{BalanceHistory, MemoryObjectStore, ObjectStore};
use swapd::wallet::Wallet;

#[tokio::test]
async fn missing_capabilities_disable_only_their_jobs() {
    let orchestrator = Arc::new(Orchestrator::new(
        config("production"),
        Arc::new(MemoryObjectStore::new()) as Arc<dyn ObjectStore>,
        Capabilities::default(),
    ));

    // Only the retrain schedule: no market data, no wallets.
    assert_eq!(orchestrator.start(), 1);
    assert!(orchestrator.saga().is_none());
    orchestrator.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn full_capabilities_schedule_every_job() {
    let capabilities = Capabilities {
        market: Some(Arc::new(FakeMarket::new(candles(0, 10, 1.0))) as Arc<dyn MarketDataSource>),
        broker: Some(Arc::new(FakeBroker::new(dec!(0.0056))) as Arc<dyn ExchangeBroker>),
        wallets: vec![Arc::new(FakeWallet::new(Coin::Eth, dec!(1))) as Arc<dyn Wallet>],
    };
    let orchestrator = Arc::new(Orchestrator::new(
        config("production"),
        Arc::new(MemoryObjectStore::new()) as Arc<dyn ObjectStore>,
        capabilities,
    ));

    // dataset refresh, one trade schedule, retrain, balance
    assert_eq!(orchestrator.start(), 4);
    assert!(orchestrator.saga().is_some());
    orchestrator.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn scheduled_balance_job_appends_snapshots_until_shutdown() {
    let store = Arc::new(MemoryObjectStore::new());
    let capabilities = Capabilities {
        wallets: vec![Arc::new(FakeWallet::new(Coin::Waves, dec!(14.5))) as Arc<dyn Wallet>],
        ..Default::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        config("development"),
        store.clone() as Arc<dyn ObjectStore>,
        capabilities,
    ));
    orchestrator.start();

    // Default cadence is ten minutes.
    tokio::time::sleep(Duration::from_secs(10 * 60 + 1)).await;
    tokio::task::yield_now().await;
    orchestrator.shutdown(Duration::from_secs(1)).await;

    let history = BalanceHistory::new(store.clone());
    let first = history.snapshots(Coin::Waves).await.unwrap().len();
    assert_eq!(first, 1);

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert_eq!(history.snapshots(Coin::Waves).await.unwrap().len(), first);
}

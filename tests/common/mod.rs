#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use swapd::config::AppConfig;
use swapd::domain::{Candle, Coin, Granularity, PredictionSignal, TradeCommand};
use swapd::error::{Result, SwapdError};
use swapd::exchange::{CreatedExchange, ExchangeBroker};
use swapd::market::MarketDataSource;
use swapd::ml::{Predictor, TrainingReport};
use swapd::wallet::{PreparedTransfer, TransferStatus, Wallet};

/// Config with one WAVES/ETH pair, read the same way the daemon reads it.
pub fn config(environment: &str) -> AppConfig {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("default.toml"),
        format!(
            r#"
environment = "{environment}"

[trading]
base_threshold = 0.0005
precedence = "primary"
primary_predictor = "fixed"

[[trading.pairs]]
base = "WAVES"
quote = "ETH"
min_base_balance = 14.423
min_quote_balance = 0.0056

[saga]
confirm_timeout_secs = 5
confirm_poll_secs = 1
max_resume_attempts = 3
"#
        ),
    )
    .unwrap();
    AppConfig::load_from(dir.path()).unwrap()
}

pub fn candles(start: i64, count: usize, close: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| Candle::flat(start + 60 * i as i64, close))
        .collect()
}

/// Serves the same candles for every series
pub struct FakeMarket {
    pub candles: Vec<Candle>,
    pub price: f64,
    pub candle_calls: AtomicU32,
}

impl FakeMarket {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            price: 2000.0,
            candle_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn candles(
        &self,
        _base: Coin,
        _quote: Coin,
        _granularity: Granularity,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        let skip = self.candles.len().saturating_sub(limit as usize);
        Ok(self.candles[skip..].to_vec())
    }

    async fn current_price(&self, _base: Coin, _quote: Coin) -> Result<f64> {
        Ok(self.price)
    }
}

/// Lists eth_waves both ways and slows down quote creation on request
pub struct FakeBroker {
    pub min_amount: Decimal,
    pub create_delay: Duration,
    pub created: AtomicU32,
}

impl FakeBroker {
    pub fn new(min_amount: Decimal) -> Self {
        Self {
            min_amount,
            create_delay: Duration::ZERO,
            created: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ExchangeBroker for FakeBroker {
    async fn available_pairs(&self) -> Result<Vec<String>> {
        Ok(vec!["eth_waves".to_string(), "waves_eth".to_string()])
    }

    async fn min_amount(&self, _from: Coin, _to: Coin) -> Result<Decimal> {
        Ok(self.min_amount)
    }

    async fn create_exchange(
        &self,
        _from: Coin,
        _to: Coin,
        _amount: Decimal,
        _destination: &str,
    ) -> Result<CreatedExchange> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        Ok(CreatedExchange {
            id: format!("ex-{}", n),
            deposit_address: "broker-deposit".to_string(),
        })
    }
}

/// Wallet whose transfers confirm immediately
pub struct FakeWallet {
    pub coin: Coin,
    pub balance: Decimal,
    pub prepared: AtomicU32,
    pub broadcasts: Mutex<Vec<String>>,
}

impl FakeWallet {
    pub fn new(coin: Coin, balance: Decimal) -> Self {
        Self {
            coin,
            balance,
            prepared: AtomicU32::new(0),
            broadcasts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    fn coin(&self) -> Coin {
        self.coin
    }

    fn address(&self) -> String {
        format!("my-{}", self.coin)
    }

    async fn balance(&self) -> Result<Decimal> {
        Ok(self.balance)
    }

    async fn prepare_transfer(&self, to: &str, amount: Decimal) -> Result<PreparedTransfer> {
        let n = self.prepared.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PreparedTransfer {
            tx_ref: format!("{}-tx-{}", self.coin, n),
            payload: format!("signed-{}", n),
            to: to.to_string(),
            amount,
        })
    }

    async fn broadcast(&self, prepared: &PreparedTransfer) -> Result<()> {
        self.broadcasts.lock().unwrap().push(prepared.tx_ref.clone());
        Ok(())
    }

    async fn transfer_status(&self, _tx_ref: &str) -> Result<TransferStatus> {
        Ok(TransferStatus::Confirmed)
    }

    async fn transaction_fee(&self, _tx_ref: &str) -> Result<Decimal> {
        Ok(Decimal::new(1, 4))
    }
}

/// Predicts `ratio × last close` and classifies by direction; training
/// takes `train_time` of wall clock.
pub struct FixedPredictor {
    pub ratio: f64,
    pub train_time: Duration,
    pub trained: AtomicU32,
}

impl FixedPredictor {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio,
            train_time: Duration::ZERO,
            trained: AtomicU32::new(0),
        }
    }
}

impl Predictor for FixedPredictor {
    fn name(&self) -> &str {
        "fixed"
    }

    fn window(&self) -> usize {
        1
    }

    fn predict(&self, window: &[Candle]) -> Result<PredictionSignal> {
        let last = window
            .last()
            .ok_or_else(|| SwapdError::Prediction("empty window".into()))?;
        let command = if self.ratio > 1.0 {
            TradeCommand::Buy
        } else if self.ratio < 1.0 {
            TradeCommand::Sell
        } else {
            TradeCommand::Hold
        };
        Ok(PredictionSignal {
            predictor: "fixed".to_string(),
            produced_at: Utc::now(),
            target_time: last.time + 60,
            predicted_value: last.close * self.ratio,
            command,
        })
    }

    fn train(&self, history: &[Candle]) -> Result<TrainingReport> {
        std::thread::sleep(self.train_time);
        self.trained.fetch_add(1, Ordering::SeqCst);
        Ok(TrainingReport {
            samples: history.len(),
            noise_band: 0.0,
        })
    }
}

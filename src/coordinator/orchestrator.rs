//! Orchestrator
//!
//! Owns the schedules and the job bodies they fire:
//!   - dataset refresh: fetch candles and merge them into the dataset store
//!   - retrain: refit predictors with trading suspended
//!   - trade cycle: predict → decide → balance check → exchange saga
//!   - balance report
//!
//! Every job body is at-most-one-in-flight per key; an overlapping tick
//! skips instead of queueing. Job bodies never return errors to the
//! scheduler.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, PairConfig, SeriesConfig};
use crate::coordination::{InFlightRegistry, IntervalScheduler, TrainingGate};
use crate::domain::{Candle, Coin, PredictionSignal, TradeCommand, TradeDecision, TradingPair};
use crate::error::{Result, SwapdError};
use crate::exchange::ExchangeBroker;
use crate::market::MarketDataSource;
use crate::ml::{build_predictors, Predictor};
use crate::persistence::{
    BalanceHistory, DatasetStore, ObjectStore, PredictionLog, SettlementLog, TransferJournal,
};
use crate::saga::{ExchangeSaga, Resolution, ResumeOutcome};
use crate::services::{BalanceMonitor, ManualTriggers};
use crate::strategy::DecisionEngine;
use crate::wallet::Wallet;

use super::state::{CycleOutcome, CycleReport};

const TRADE_KEY_PREFIX: &str = "trade:";
const RETRAIN_KEY: &str = "retrain";
const DATASET_KEY: &str = "dataset_refresh";
const BALANCE_KEY: &str = "balance";

const DRAIN_POLL: Duration = Duration::from_millis(250);

/// External collaborators that could be initialised from configuration.
/// A missing capability disables only the jobs that need it.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub market: Option<Arc<dyn MarketDataSource>>,
    pub broker: Option<Arc<dyn ExchangeBroker>>,
    pub wallets: Vec<Arc<dyn Wallet>>,
}

pub struct Orchestrator {
    config: AppConfig,
    scheduler: IntervalScheduler,
    gate: TrainingGate,
    in_flight: InFlightRegistry,
    datasets: DatasetStore,
    predictions: PredictionLog,
    predictors: HashMap<TradingPair, Vec<Arc<dyn Predictor>>>,
    engine: DecisionEngine,
    market: Option<Arc<dyn MarketDataSource>>,
    saga: Option<Arc<ExchangeSaga>>,
    balances: BalanceMonitor,
}

impl Orchestrator {
    pub fn new(config: AppConfig, store: Arc<dyn ObjectStore>, capabilities: Capabilities) -> Self {
        let predictors = config
            .trading
            .pairs
            .iter()
            .map(|p| (p.pair(), build_predictors(&config.predictors)))
            .collect();
        let engine = DecisionEngine::new(config.trading.precedence_policy(&config.predictors));

        let saga = match (&capabilities.broker, capabilities.wallets.is_empty()) {
            (Some(broker), false) => {
                let wallets = capabilities
                    .wallets
                    .iter()
                    .map(|w| (w.coin(), Arc::clone(w)))
                    .collect();
                Some(Arc::new(ExchangeSaga::new(
                    Arc::clone(broker),
                    wallets,
                    Arc::new(TransferJournal::new(Arc::clone(&store))),
                    Arc::new(SettlementLog::new(Arc::clone(&store))),
                    config.saga.clone(),
                )))
            }
            (None, _) => {
                warn!("No exchange broker; exchanges disabled");
                None
            }
            (Some(_), true) => {
                warn!("No wallets; exchanges disabled");
                None
            }
        };

        let balances = BalanceMonitor::new(
            capabilities.wallets.clone(),
            Arc::new(BalanceHistory::new(Arc::clone(&store))),
            capabilities.market.clone(),
        );

        Self {
            config,
            scheduler: IntervalScheduler::new(),
            gate: TrainingGate::new(),
            in_flight: InFlightRegistry::new(),
            datasets: DatasetStore::new(Arc::clone(&store)),
            predictions: PredictionLog::new(store),
            predictors,
            engine,
            market: capabilities.market,
            saga,
            balances,
        }
    }

    /// Replace the predictors of one pair
    pub fn with_predictors(mut self, pair: TradingPair, predictors: Vec<Arc<dyn Predictor>>) -> Self {
        self.predictors.insert(pair, predictors);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn gate(&self) -> &TrainingGate {
        &self.gate
    }

    pub fn datasets(&self) -> &DatasetStore {
        &self.datasets
    }

    pub fn saga(&self) -> Option<&Arc<ExchangeSaga>> {
        self.saga.as_ref()
    }

    /// Schedule every job whose capabilities are present.
    /// Returns the number of schedules created.
    pub fn start(self: &Arc<Self>) -> usize {
        let schedules = self.config.schedules.clone();
        let mut created = 0;

        if self.market.is_some() {
            let this = Arc::clone(self);
            self.scheduler.schedule("dataset_refresh", schedules.dataset_refresh, move || {
                let this = Arc::clone(&this);
                async move {
                    if let Err(e) = this.refresh_datasets().await {
                        error!("Dataset refresh failed: {}", e);
                    }
                }
            });
            created += 1;

            for pair_config in self.config.trading.pairs.clone() {
                let this = Arc::clone(self);
                let name = format!("{}{}", TRADE_KEY_PREFIX, pair_config.pair());
                self.scheduler.schedule(&name, schedules.trade, move || {
                    let this = Arc::clone(&this);
                    let pair_config = pair_config.clone();
                    async move {
                        let report = this.trade_cycle(&pair_config, true).await;
                        debug!(pair = %report.pair, "Trade cycle: {:?}", report.outcome);
                    }
                });
                created += 1;
            }
        } else {
            warn!("No market data source; dataset refresh and trading disabled");
        }

        if self.predictors.values().any(|p| !p.is_empty()) {
            let this = Arc::clone(self);
            self.scheduler.schedule("retrain", schedules.retrain, move || {
                let this = Arc::clone(&this);
                async move {
                    if let Err(e) = this.retrain().await {
                        error!("Retrain failed: {}", e);
                    }
                }
            });
            created += 1;
        }

        if self.balances.wallet_count() > 0 {
            let this = Arc::clone(self);
            self.scheduler.schedule("balance", schedules.balance, move || {
                let this = Arc::clone(&this);
                async move {
                    this.report_balances().await;
                }
            });
            created += 1;
        } else {
            warn!("No wallets; balance reports disabled");
        }

        info!(
            schedules = created,
            production = self.config.is_production(),
            "Orchestrator started"
        );
        created
    }

    /// Cancel every schedule, then wait up to `drain` for running trade
    /// cycles. A saga past quote creation is never aborted from here.
    pub async fn shutdown(&self, drain: Duration) {
        let cancelled = self.scheduler.cancel_all();
        info!(cancelled, "Schedules cancelled");

        let deadline = Instant::now() + drain;
        loop {
            let running = self.in_flight.count_prefix(TRADE_KEY_PREFIX);
            if running == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(running, "Drain timeout; trade cycles still running");
                break;
            }
            debug!(running, "Waiting for trade cycles to finish");
            tokio::time::sleep(DRAIN_POLL).await;
        }
        info!("Orchestrator stopped");
    }

    /// Every series refreshed on the dataset schedule: the configured
    /// datasets plus each traded pair's own series.
    fn refreshed_series(&self) -> Vec<SeriesConfig> {
        let mut series: BTreeMap<String, SeriesConfig> = BTreeMap::new();
        for s in &self.config.datasets {
            series.insert(s.series_name(), s.clone());
        }
        for p in &self.config.trading.pairs {
            let s = SeriesConfig {
                base: p.base,
                quote: p.quote,
                granularity: p.granularity,
            };
            series.entry(s.series_name()).or_insert(s);
        }
        series.into_values().collect()
    }

    /// Fetch and merge every series. Returns the number of new candles.
    pub async fn refresh_datasets(&self) -> Result<usize> {
        let Some(_ticket) = self.in_flight.try_acquire(DATASET_KEY) else {
            info!("Dataset refresh still running, skipping tick");
            return Ok(0);
        };
        let market = self.market.as_ref().ok_or_else(|| {
            SwapdError::CapabilityUnavailable("market data source".to_string())
        })?;

        let series = self.refreshed_series();
        let mut added = 0;
        let mut last_error = None;
        for s in &series {
            let name = s.series_name();
            let fetched = market
                .candles(s.base, s.quote, s.granularity, self.config.market.training_limit)
                .await;
            match fetched {
                Ok(candles) => match self.datasets.merge(&name, &candles).await {
                    Ok(summary) => {
                        info!(series = %name, added = summary.added, total = summary.total, "Trading history saved");
                        added += summary.added;
                    }
                    Err(e) => {
                        error!(series = %name, "Merge failed: {}", e);
                        last_error = Some(e);
                    }
                },
                Err(e) => {
                    warn!(series = %name, "No trading history: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if added == 0 => Err(e),
            _ => Ok(added),
        }
    }

    /// Refit every predictor on its pair's persisted history with trading
    /// suspended. Overlapping retrains skip.
    pub async fn retrain(&self) -> Result<()> {
        let Some(_ticket) = self.in_flight.try_acquire(RETRAIN_KEY) else {
            info!("Retrain still running, skipping tick");
            return Ok(());
        };
        let _scope = self.gate.retrain_scope();

        let mut failed = 0;
        let mut trained = 0;
        for pair_config in &self.config.trading.pairs {
            let pair = pair_config.pair();
            let Some(predictors) = self.predictors.get(&pair) else {
                continue;
            };
            let series = pair.series_name(pair_config.granularity);
            let history: Arc<[Candle]> = match self.datasets.get(&series).await {
                Ok(candles) => candles.into(),
                Err(e) => {
                    error!(series = %series, "Cannot load training data: {}", e);
                    failed += predictors.len();
                    continue;
                }
            };
            info!(series = %series, candles = history.len(), "Retraining models");

            for predictor in predictors {
                let model = Arc::clone(predictor);
                let data = Arc::clone(&history);
                match tokio::task::spawn_blocking(move || model.train(&data)).await {
                    Ok(Ok(report)) => {
                        info!(
                            predictor = predictor.name(),
                            samples = report.samples,
                            noise_band = report.noise_band,
                            "Model trained"
                        );
                        trained += 1;
                    }
                    Ok(Err(e)) => {
                        warn!(predictor = predictor.name(), "Training failed: {}", e);
                        failed += 1;
                    }
                    Err(e) => {
                        error!(predictor = predictor.name(), "Training task panicked: {}", e);
                        failed += 1;
                    }
                }
            }
        }

        if failed > 0 {
            return Err(SwapdError::Prediction(format!(
                "{} of {} models failed to train",
                failed,
                failed + trained
            )));
        }
        Ok(())
    }

    pub async fn report_balances(&self) {
        let Some(_ticket) = self.in_flight.try_acquire(BALANCE_KEY) else {
            info!("Balance report still running, skipping tick");
            return;
        };
        self.balances.report_all().await;
    }

    /// Resume journaled transfers of every pair
    pub async fn resume_all_pending(&self) -> Vec<(TradingPair, ResumeOutcome)> {
        let Some(saga) = &self.saga else {
            return Vec::new();
        };
        let mut outcomes = Vec::new();
        for pair_config in &self.config.trading.pairs {
            let pair = pair_config.pair();
            match saga.resume_pending(&pair).await {
                Ok(resumed) => outcomes.extend(resumed.into_iter().map(|o| (pair, o))),
                Err(e) => error!(pair = %pair, "Cannot read transfer journal: {}", e),
            }
        }
        outcomes
    }

    /// Apply an operator decision to a journaled transfer
    pub async fn resolve(
        &self,
        pair: &TradingPair,
        quote_id: &str,
        resolution: Resolution,
    ) -> Result<ResumeOutcome> {
        let saga = self
            .saga
            .as_ref()
            .ok_or_else(|| SwapdError::CapabilityUnavailable("exchange saga".to_string()))?;
        saga.resolve(pair, quote_id, resolution).await
    }

    /// One decision cycle for one pair. With `execute` false, or outside
    /// production, the decision is only logged.
    pub async fn trade_cycle(&self, pair_config: &PairConfig, execute: bool) -> CycleReport {
        let pair = pair_config.pair();
        let outcome = self.run_cycle(&pair, pair_config, execute).await;
        match &outcome {
            CycleOutcome::Executed { funds_at_risk: true, result, .. } => {
                error!(pair = %pair, "Exchange needs attention: {}", result)
            }
            other => info!(pair = %pair, "Cycle outcome: {:?}", other),
        }
        CycleReport::new(&pair, outcome)
    }

    async fn run_cycle(
        &self,
        pair: &TradingPair,
        pair_config: &PairConfig,
        execute: bool,
    ) -> CycleOutcome {
        if !self.gate.is_trading_enabled() {
            info!(pair = %pair, "Cannot trade now, models are retraining");
            return CycleOutcome::Suspended;
        }
        let key = format!("{}{}", TRADE_KEY_PREFIX, pair);
        let Some(_ticket) = self.in_flight.try_acquire(&key) else {
            info!(pair = %pair, "Previous cycle still running, skipping tick");
            return CycleOutcome::InFlight;
        };

        let saga = self
            .saga
            .as_ref()
            .filter(|_| execute && self.config.is_production());
        if let Some(saga) = saga {
            if let Err(e) = saga.resume_pending(pair).await {
                error!(pair = %pair, "Cannot resume pending transfers: {}", e);
            }
        }

        let decision = match self.decide(pair, pair_config).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(pair = %pair, "No decision: {}", e);
                return CycleOutcome::unavailable(e);
            }
        };
        let command = decision.command;
        let current_price = decision.current_price;
        if command.is_hold() {
            info!(pair = %pair, "No action");
            return CycleOutcome::Hold { current_price };
        }
        self.log_potential_profit(pair, pair_config, &decision).await;

        let Some(saga) = saga else {
            return CycleOutcome::DryRun {
                command,
                current_price,
            };
        };

        // A retrain may have started while predicting.
        if !self.gate.is_trading_enabled() {
            info!(pair = %pair, "Cannot trade now, models are retraining");
            return CycleOutcome::Suspended;
        }

        match saga.is_blocked(pair).await {
            Ok(false) => {}
            Ok(true) => {
                warn!(pair = %pair, "Unresolved transfers, no new exchange");
                return CycleOutcome::Blocked { command };
            }
            Err(e) => return CycleOutcome::unavailable(e),
        }

        let (from, to, minimum) = match command {
            TradeCommand::Buy => (pair.quote, pair.base, pair_config.min_quote_balance),
            _ => (pair.base, pair.quote, pair_config.min_base_balance),
        };
        let balance = match self.balance_of(saga, from).await {
            Ok(balance) => balance,
            Err(e) => return CycleOutcome::unavailable(e),
        };
        if balance < minimum {
            info!(pair = %pair, %command, coin = %from, %balance, %minimum, "Balance too low to exchange");
            return CycleOutcome::BalanceTooLow {
                command,
                coin: from,
                balance,
                minimum,
            };
        }

        info!(pair = %pair, %command, "Exchanging {} for {}", from, to);
        let outcome = saga.exchange(pair, from, to).await;
        CycleOutcome::executed(command, &outcome)
    }

    async fn balance_of(&self, saga: &ExchangeSaga, coin: Coin) -> Result<Decimal> {
        let wallet = saga
            .wallet(coin)
            .ok_or_else(|| SwapdError::CapabilityUnavailable(format!("{} wallet", coin)))?;
        wallet.balance().await
    }

    async fn decide(&self, pair: &TradingPair, pair_config: &PairConfig) -> Result<TradeDecision> {
        let market = self.market.as_ref().ok_or_else(|| {
            SwapdError::CapabilityUnavailable("market data source".to_string())
        })?;
        let window = market
            .candles(
                pair.base,
                pair.quote,
                pair_config.granularity,
                self.config.market.prediction_limit,
            )
            .await?;
        let current_price = window
            .last()
            .map(|c| c.close)
            .ok_or_else(|| SwapdError::MarketDataUnavailable(format!("no candles for {}", pair)))?;

        let signals = self.collect_signals(pair, &window);
        let produced_at = Utc::now().timestamp_millis();
        if let Err(e) = self.predictions.append(pair, produced_at, &signals).await {
            warn!(pair = %pair, "Prediction history not saved: {}", e);
        }

        Ok(self
            .engine
            .decide(&signals, current_price, self.config.trading.fee_adjusted_threshold()))
    }

    fn collect_signals(&self, pair: &TradingPair, window: &[Candle]) -> Vec<PredictionSignal> {
        let Some(predictors) = self.predictors.get(pair) else {
            return Vec::new();
        };
        predictors
            .iter()
            .filter_map(|p| match p.predict(window) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    warn!(pair = %pair, predictor = p.name(), "No prediction: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Expected gain of exchanging the configured minimum lot
    async fn log_potential_profit(
        &self,
        pair: &TradingPair,
        pair_config: &PairConfig,
        decision: &TradeDecision,
    ) {
        let Some(source) = decision.confidence_sources.first() else {
            return;
        };
        let current = decision.current_price;
        let (spent, lot, ratio) = match decision.command {
            TradeCommand::Buy => (
                pair.quote,
                pair_config.min_quote_balance,
                (source.predicted_value - current) / current,
            ),
            TradeCommand::Sell => (
                pair.base,
                pair_config.min_base_balance,
                (current - source.predicted_value) / current,
            ),
            TradeCommand::Hold => return,
        };
        let gain = lot.to_f64().unwrap_or(0.0) * ratio;

        let fiat = match &self.market {
            Some(market) => market.current_price(spent, Coin::Usd).await.ok(),
            None => None,
        };
        match fiat {
            Some(price) => info!(
                pair = %pair,
                command = %decision.command,
                "Potential profit: {:.8} {} (~{:.4} USD)",
                gain,
                spent,
                gain * price
            ),
            None => info!(pair = %pair, command = %decision.command, "Potential profit: {:.8} {}", gain, spent),
        }
    }
}

#[async_trait]
impl ManualTriggers for Orchestrator {
    async fn retrain(&self) -> Result<()> {
        Orchestrator::retrain(self).await
    }

    async fn predict(&self) -> Result<serde_json::Value> {
        let mut reports = Vec::new();
        for pair_config in &self.config.trading.pairs {
            reports.push(self.trade_cycle(pair_config, false).await);
        }
        Ok(serde_json::to_value(reports)?)
    }

    async fn save_history(&self) -> Result<usize> {
        self.refresh_datasets().await
    }
}

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::coordination::{Every, TimeUnit};
use crate::domain::{Coin, Granularity, TradingPair};
use crate::strategy::PrecedencePolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `production` executes exchanges, anything else only logs decisions
    #[serde(default = "default_environment")]
    pub environment: String,
    pub schedules: SchedulesConfig,
    pub market: MarketConfig,
    #[serde(default = "default_datasets")]
    pub datasets: Vec<SeriesConfig>,
    pub trading: TradingConfig,
    #[serde(default = "default_predictors")]
    pub predictors: Vec<PredictorConfig>,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub saga: SagaConfig,
    #[serde(default)]
    pub wallets: WalletsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulesConfig {
    pub dataset_refresh: Every,
    pub retrain: Every,
    pub trade: Every,
    pub balance: Every,
}

impl Default for SchedulesConfig {
    fn default() -> Self {
        Self {
            dataset_refresh: Every::new(10, TimeUnit::Minutes),
            retrain: Every::new(12, TimeUnit::Hours),
            trade: Every::new(10, TimeUnit::Minutes),
            balance: Every::new(10, TimeUnit::Minutes),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Historical OHLCV endpoint root
    pub api_url: String,
    /// Spot price endpoint
    pub price_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Candles fetched per series on each dataset refresh
    #[serde(default = "default_training_limit")]
    pub training_limit: u32,
    /// Candles fetched for each prediction window
    #[serde(default = "default_prediction_limit")]
    pub prediction_limit: u32,
}

fn default_training_limit() -> u32 {
    2000
}

fn default_prediction_limit() -> u32 {
    200
}

/// A price series kept in the dataset store
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SeriesConfig {
    pub base: Coin,
    pub quote: Coin,
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
}

impl SeriesConfig {
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(self.base, self.quote)
    }

    pub fn series_name(&self) -> String {
        self.pair().series_name(self.granularity)
    }
}

fn default_granularity() -> Granularity {
    Granularity::Minute
}

fn default_datasets() -> Vec<SeriesConfig> {
    [(Coin::Waves, Coin::Usd), (Coin::Eth, Coin::Usd), (Coin::Waves, Coin::Eth)]
        .into_iter()
        .map(|(base, quote)| SeriesConfig {
            base,
            quote,
            granularity: Granularity::Minute,
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Minimum predicted move before fees (e.g., 0.0005 = 0.05%)
    pub base_threshold: f64,
    /// Expected network + broker fee as a fraction of the traded amount
    #[serde(default)]
    pub network_fee_pct: f64,
    #[serde(default)]
    pub precedence: PrecedenceKind,
    /// Predictor whose vote is authoritative under `precedence = "primary"`
    #[serde(default)]
    pub primary_predictor: Option<String>,
    pub pairs: Vec<PairConfig>,
}

impl TradingConfig {
    /// Threshold a predicted move has to beat once fees are paid
    pub fn fee_adjusted_threshold(&self) -> f64 {
        crate::strategy::fee_adjusted_threshold(self.base_threshold, self.network_fee_pct)
    }

    pub fn precedence_policy(&self, predictors: &[PredictorConfig]) -> PrecedencePolicy {
        match self.precedence {
            PrecedenceKind::Primary => PrecedencePolicy::Primary {
                predictor: self
                    .primary_predictor
                    .clone()
                    .or_else(|| predictors.first().map(|p| p.name.clone()))
                    .unwrap_or_default(),
            },
            PrecedenceKind::Unanimous => PrecedencePolicy::Unanimous,
            PrecedenceKind::Majority => PrecedencePolicy::Majority,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrecedenceKind {
    #[default]
    Primary,
    Unanimous,
    Majority,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub base: Coin,
    pub quote: Coin,
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
    /// Smallest base balance that allows a Sell
    pub min_base_balance: Decimal,
    /// Smallest quote balance that allows a Buy
    pub min_quote_balance: Decimal,
}

impl PairConfig {
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(self.base, self.quote)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    pub name: String,
    /// Candles ahead of the last close
    pub horizon: u32,
    /// Closes used for the trend fit
    pub window: usize,
}

fn default_predictors() -> Vec<PredictorConfig> {
    vec![
        PredictorConfig {
            name: "minute-short".to_string(),
            horizon: 1,
            window: 30,
        },
        PredictorConfig {
            name: "minute-long".to_string(),
            horizon: 10,
            window: 120,
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SagaConfig {
    /// How long to wait for a broadcast transfer to confirm
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    /// Polling interval for transfer status
    #[serde(default = "default_confirm_poll")]
    pub confirm_poll_secs: u64,
    /// Resume attempts before an unconfirmed transfer needs an operator
    #[serde(default = "default_max_resume_attempts")]
    pub max_resume_attempts: u32,
}

fn default_confirm_timeout() -> u64 {
    600
}

fn default_confirm_poll() -> u64 {
    15
}

fn default_max_resume_attempts() -> u32 {
    20
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: default_confirm_timeout(),
            confirm_poll_secs: default_confirm_poll(),
            max_resume_attempts: default_max_resume_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletsConfig {
    #[serde(default)]
    pub ethereum: Option<EthereumWalletConfig>,
    #[serde(default)]
    pub waves: Option<WavesWalletConfig>,
}

#[derive(Clone, Deserialize)]
pub struct EthereumWalletConfig {
    pub rpc_url: String,
    pub private_key: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

// Keeps the key out of `{:?}` output.
impl std::fmt::Debug for EthereumWalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumWalletConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

fn default_chain_id() -> u64 {
    1
}

#[derive(Clone, Deserialize)]
pub struct WavesWalletConfig {
    pub node_url: String,
    pub address: String,
    /// Node API key for the node-held signing wallet
    pub api_key: String,
}

impl std::fmt::Debug for WavesWalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavesWalletConfig")
            .field("node_url", &self.node_url)
            .field("address", &self.address)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding every persisted blob
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Port for the health and manual-trigger API; disabled when unset
    #[serde(default)]
    pub port: Option<u16>,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("environment", "development")?
            .set_default("schedules.dataset_refresh.interval", 10)?
            .set_default("schedules.dataset_refresh.units", "minutes")?
            .set_default("schedules.retrain.interval", 12)?
            .set_default("schedules.retrain.units", "hours")?
            .set_default("schedules.trade.interval", 10)?
            .set_default("schedules.trade.units", "minutes")?
            .set_default("schedules.balance.interval", 10)?
            .set_default("schedules.balance.units", "minutes")?
            .set_default("market.api_url", "https://min-api.cryptocompare.com/data/v2")?
            .set_default("market.price_url", "https://min-api.cryptocompare.com/data/price")?
            .set_default("broker.api_url", "https://api.changenow.io/v1")?
            .set_default("trading.base_threshold", 0.0005)?
            .set_default("trading.network_fee_pct", 0.0)?
            .set_default("trading.pairs", Vec::<String>::new())?
            .set_default("storage.root", "./storage")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SWAPD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SWAPD_BROKER__API_KEY, etc.)
            .add_source(
                Environment::with_prefix("SWAPD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, every) in [
            ("dataset_refresh", &self.schedules.dataset_refresh),
            ("retrain", &self.schedules.retrain),
            ("trade", &self.schedules.trade),
            ("balance", &self.schedules.balance),
        ] {
            if every.interval == 0 {
                errors.push(format!("schedules.{name}.interval must be positive"));
            }
        }

        if !self.trading.base_threshold.is_finite() || self.trading.base_threshold < 0.0 {
            errors.push("trading.base_threshold must be a non-negative number".to_string());
        }

        if !self.trading.network_fee_pct.is_finite() || self.trading.network_fee_pct < 0.0 {
            errors.push("trading.network_fee_pct must be a non-negative number".to_string());
        }

        for pair in &self.trading.pairs {
            if pair.base == pair.quote {
                errors.push(format!("trading pair {} trades a coin against itself", pair.pair()));
            }
            if pair.base.exchange_code().is_none() || pair.quote.exchange_code().is_none() {
                errors.push(format!("trading pair {} contains a fiat currency", pair.pair()));
            }
            if pair.min_base_balance < Decimal::ZERO || pair.min_quote_balance < Decimal::ZERO {
                errors.push(format!("trading pair {} has a negative minimum balance", pair.pair()));
            }
        }

        if self.predictors.is_empty() {
            errors.push("at least one predictor must be configured".to_string());
        }

        for predictor in &self.predictors {
            if predictor.window < 2 {
                errors.push(format!("predictor {} needs a window of at least 2", predictor.name));
            }
        }

        if self.trading.precedence == PrecedenceKind::Primary {
            if let Some(primary) = &self.trading.primary_predictor {
                if !self.predictors.iter().any(|p| &p.name == primary) {
                    errors.push(format!("primary predictor {primary} is not configured"));
                }
            }
        }

        if self.saga.confirm_poll_secs == 0 {
            errors.push("saga.confirm_poll_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trading() -> TradingConfig {
        TradingConfig {
            base_threshold: 0.0005,
            network_fee_pct: 0.002,
            precedence: PrecedenceKind::Primary,
            primary_predictor: None,
            pairs: vec![PairConfig {
                base: Coin::Waves,
                quote: Coin::Eth,
                granularity: Granularity::Minute,
                min_base_balance: dec!(14.423),
                min_quote_balance: dec!(0.0056),
            }],
        }
    }

    #[test]
    fn threshold_includes_fees() {
        let threshold = trading().fee_adjusted_threshold();
        assert!((threshold - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn primary_defaults_to_first_predictor() {
        let policy = trading().precedence_policy(&default_predictors());
        assert_eq!(
            policy,
            PrecedencePolicy::Primary {
                predictor: "minute-short".to_string()
            }
        );
    }

    #[test]
    fn load_reads_toml_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
environment = "production"

[schedules.trade]
interval = 30
units = "seconds"

[trading]
base_threshold = 0.001
precedence = "majority"

[[trading.pairs]]
base = "WAVES"
quote = "ETH"
min_base_balance = 14.423
min_quote_balance = 0.0056
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert!(config.is_production());
        assert_eq!(config.schedules.trade, Every::new(30, TimeUnit::Seconds));
        assert_eq!(config.schedules.retrain, Every::new(12, TimeUnit::Hours));
        assert_eq!(config.trading.precedence, PrecedenceKind::Majority);
        assert_eq!(config.trading.pairs[0].pair().to_string(), "WAVES-ETH");
        assert_eq!(config.datasets.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_collects_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[schedules.balance]
interval = 0
units = "minutes"

[trading]
base_threshold = -1.0

[[trading.pairs]]
base = "ETH"
quote = "USD"
min_base_balance = 1
min_quote_balance = 1
"#,
        )
        .unwrap();

        let errors = AppConfig::load_from(dir.path()).unwrap().validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }
}

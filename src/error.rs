use thiserror::Error;

/// Main error type for the exchange daemon
#[derive(Error, Debug)]
pub enum SwapdError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Exchange broker errors
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Pair unavailable: {0}")]
    PairUnavailable(String),

    #[error("Invalid minimum amount for {pair}: {amount}")]
    InvalidMinimumAmount { pair: String, amount: String },

    // Wallet errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// The transfer was never accepted by the network; no funds moved.
    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    /// The broadcast outcome is unknown; funds may be in flight.
    #[error("Transfer status unknown: {0}")]
    TransferStatusUnknown(String),

    // Prediction errors
    #[error("Prediction failed: {0}")]
    Prediction(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SwapdError {
    /// Errors that are expected to clear up by the next scheduled tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SwapdError::Http(_)
                | SwapdError::MarketDataUnavailable(_)
                | SwapdError::Broker(_)
                | SwapdError::Storage(_)
                | SwapdError::Io(_)
        )
    }
}

/// Result type alias for SwapdError
pub type Result<T> = std::result::Result<T, SwapdError>;

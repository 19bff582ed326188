pub mod balance;
pub mod candle;
pub mod coin;
pub mod exchange;
pub mod signal;

pub use balance::BalanceSnapshot;
pub use candle::{Candle, Granularity, HistorySeries};
pub use coin::{Coin, TradingPair};
pub use exchange::{ExchangeQuote, PendingTransfer, SettlementRecord, TransferStage};
pub use signal::{PredictionSignal, PredictorVote, TradeCommand, TradeDecision};

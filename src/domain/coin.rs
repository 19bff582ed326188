use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::Granularity;
use crate::error::{Result, SwapdError};

/// Currency symbol as used by price feeds and wallets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coin {
    Usd,
    Btc,
    Eth,
    Usdt,
    Bnb,
    Trx,
    Matic,
    Xmr,
    Waves,
}

impl Coin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Coin::Usd => "USD",
            Coin::Btc => "BTC",
            Coin::Eth => "ETH",
            Coin::Usdt => "USDT",
            Coin::Bnb => "BNB",
            Coin::Trx => "TRX",
            Coin::Matic => "MATIC",
            Coin::Xmr => "XMR",
            Coin::Waves => "WAVES",
        }
    }

    /// Ticker used by the exchange broker, `None` for fiat.
    pub fn exchange_code(&self) -> Option<&'static str> {
        match self {
            Coin::Usd => None,
            Coin::Btc => Some("btc"),
            Coin::Eth => Some("eth"),
            Coin::Usdt => Some("usdt"),
            Coin::Bnb => Some("bnbbsc"),
            Coin::Trx => Some("trx"),
            Coin::Matic => Some("matic"),
            Coin::Xmr => Some("xmr"),
            Coin::Waves => Some("waves"),
        }
    }

    pub fn require_exchange_code(&self) -> Result<&'static str> {
        self.exchange_code().ok_or_else(|| {
            SwapdError::Validation(format!("{} cannot be exchanged on-chain", self))
        })
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Coin {
    type Err = SwapdError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Coin::Usd),
            "BTC" => Ok(Coin::Btc),
            "ETH" => Ok(Coin::Eth),
            "USDT" => Ok(Coin::Usdt),
            "BNB" | "BNBBSC" => Ok(Coin::Bnb),
            "TRX" => Ok(Coin::Trx),
            "MATIC" | "POLY" => Ok(Coin::Matic),
            "XMR" => Ok(Coin::Xmr),
            "WAVES" => Ok(Coin::Waves),
            other => Err(SwapdError::Validation(format!("unknown coin: {}", other))),
        }
    }
}

/// A tradable pair. Buying acquires `base` by spending `quote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: Coin,
    pub quote: Coin,
}

impl TradingPair {
    pub fn new(base: Coin, quote: Coin) -> Self {
        Self { base, quote }
    }

    /// History series name, e.g. `WAVES-ETH-minute`
    pub fn series_name(&self, granularity: Granularity) -> String {
        format!("{}-{}", self, granularity)
    }

    /// Name shared by the settlement log and transfer journal of this pair,
    /// e.g. `ETH-WAVES`.
    pub fn ledger_name(&self) -> String {
        format!("{}-{}", self.quote, self.base)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = SwapdError;

    fn from_str(raw: &str) -> Result<Self> {
        let (base, quote) = raw
            .split_once(['-', '/', '_'])
            .ok_or_else(|| SwapdError::Validation(format!("invalid pair: {}", raw)))?;
        Ok(Self::new(base.parse()?, quote.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coin_accepts_aliases() {
        assert_eq!("waves".parse::<Coin>().unwrap(), Coin::Waves);
        assert_eq!("POLY".parse::<Coin>().unwrap(), Coin::Matic);
        assert!("doge".parse::<Coin>().is_err());
    }

    #[test]
    fn pair_names() {
        let pair: TradingPair = "WAVES-ETH".parse().unwrap();
        assert_eq!(pair.series_name(Granularity::Minute), "WAVES-ETH-minute");
        assert_eq!(pair.ledger_name(), "ETH-WAVES");
        assert_eq!("waves/eth".parse::<TradingPair>().unwrap(), pair);
    }

    #[test]
    fn fiat_has_no_exchange_code() {
        assert!(Coin::Usd.require_exchange_code().is_err());
        assert_eq!(Coin::Eth.require_exchange_code().unwrap(), "eth");
    }
}

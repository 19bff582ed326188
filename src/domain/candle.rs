use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SwapdError;

/// Candle bucket size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::Minute => 60,
            Granularity::Hour => 3600,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = SwapdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" | "1m" => Ok(Granularity::Minute),
            "hour" | "hours" | "1h" => Ok(Granularity::Hour),
            other => Err(SwapdError::Validation(format!("unknown granularity: {}", other))),
        }
    }
}

/// One OHLCV observation. `time` is the bucket start in unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(rename = "volumefrom", alias = "volumeFrom", default)]
    pub volume_from: f64,
    #[serde(rename = "volumeto", alias = "volumeTo", default)]
    pub volume_to: f64,
}

impl Candle {
    /// A candle with every price set to `close`, handy for synthetic series.
    pub fn flat(time: i64, close: f64) -> Self {
        Self {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume_from: 0.0,
            volume_to: 0.0,
        }
    }
}

/// Time-keyed candle set with unique `time` keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySeries {
    candles: BTreeMap<i64, Candle>,
}

impl HistorySeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(candles: BTreeMap<i64, Candle>) -> Self {
        Self { candles }
    }

    /// Insert candles whose key is absent. Existing keys are never overwritten.
    /// Returns how many candles were added.
    pub fn merge<'a, I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = &'a Candle>,
    {
        let mut added = 0;
        for candle in incoming {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.candles.entry(candle.time)
            {
                slot.insert(candle.clone());
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<i64, Candle> {
        &self.candles
    }

    pub fn into_map(self) -> BTreeMap<i64, Candle> {
        self.candles
    }

    /// Candles ordered by time
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.values().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.values().next_back()
    }
}

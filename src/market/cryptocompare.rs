//! CryptoCompare REST client
//!
//! Uses `histominute`/`histohour` for OHLCV history and the `price`
//! endpoint for spot prices.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::MarketDataSource;
use crate::config::MarketConfig;
use crate::domain::{Candle, Coin, Granularity};
use crate::error::{Result, SwapdError};

/// Upper bound of the history endpoints
const MAX_LIMIT: u32 = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoryResponse {
    response: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<HistoryData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoryData {
    #[serde(default)]
    data: Vec<Candle>,
}

pub struct CryptoCompareClient {
    client: reqwest::Client,
    api_url: String,
    price_url: String,
    api_key: Option<String>,
}

impl CryptoCompareClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            price_url: config.price_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn history_endpoint(&self, granularity: Granularity) -> String {
        match granularity {
            Granularity::Minute => format!("{}/histominute", self.api_url),
            Granularity::Hour => format!("{}/histohour", self.api_url),
        }
    }

    fn with_key(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
    }
}

/// Drop candles the feed pads an empty market with.
fn parse_history(body: HistoryResponse) -> Result<Vec<Candle>> {
    if !body.response.eq_ignore_ascii_case("success") {
        return Err(SwapdError::MarketDataUnavailable(
            body.message.unwrap_or_else(|| body.response.clone()),
        ));
    }
    let candles = body
        .data
        .map(|d| d.data)
        .unwrap_or_default()
        .into_iter()
        .filter(|c| c.close.is_finite() && c.close > 0.0)
        .collect();
    Ok(candles)
}

fn parse_price(body: &HashMap<String, serde_json::Value>, quote: Coin) -> Result<f64> {
    if let Some(message) = body.get("Message").and_then(|m| m.as_str()) {
        return Err(SwapdError::MarketDataUnavailable(message.to_string()));
    }
    let price = body
        .get(quote.as_str())
        .and_then(|v| v.as_f64())
        .ok_or_else(|| SwapdError::InvalidMarketData(format!("no {} price in response", quote)))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(SwapdError::InvalidMarketData(format!("{} price {}", quote, price)));
    }
    Ok(price)
}

#[async_trait]
impl MarketDataSource for CryptoCompareClient {
    async fn candles(
        &self,
        base: Coin,
        quote: Coin,
        granularity: Granularity,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = self.history_endpoint(granularity);
        let mut params = vec![
            ("fsym", base.as_str().to_string()),
            ("tsym", quote.as_str().to_string()),
            ("limit", limit.min(MAX_LIMIT).to_string()),
        ];
        self.with_key(&mut params);

        debug!("Fetching {} {}-{} candles (limit {})", granularity, base, quote, limit);

        let response = self.client.get(&url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(SwapdError::MarketDataUnavailable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let candles = parse_history(response.json().await?)?;
        debug!("Fetched {} candles for {}-{}", candles.len(), base, quote);
        Ok(candles)
    }

    async fn current_price(&self, base: Coin, quote: Coin) -> Result<f64> {
        let mut params = vec![
            ("fsym", base.as_str().to_string()),
            ("tsyms", quote.as_str().to_string()),
        ];
        self.with_key(&mut params);

        let response = self.client.get(&self.price_url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(SwapdError::MarketDataUnavailable(format!(
                "price endpoint returned {}",
                response.status()
            )));
        }

        let body: HashMap<String, serde_json::Value> = response.json().await?;
        parse_price(&body, quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_body_yields_candles() {
        let raw = r#"{"Response":"Success","Message":"","HasWarning":false,"Type":100,
            "Data":{"Aggregated":false,"TimeFrom":60,"TimeTo":120,"Data":[
              {"time":60,"high":0.0042,"low":0.0040,"open":0.0041,"volumefrom":12.5,"volumeto":0.05,"close":0.0041},
              {"time":120,"high":0.0,"low":0.0,"open":0.0,"volumefrom":0,"volumeto":0,"close":0}
            ]}}"#;
        let candles = parse_history(serde_json::from_str(raw).unwrap()).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].time, 60);
        assert_eq!(candles[0].volume_from, 12.5);
    }

    #[test]
    fn history_error_is_unavailable() {
        let raw = r#"{"Response":"Error","Message":"You are over your rate limit","Data":{}}"#;
        let err = parse_history(serde_json::from_str(raw).unwrap()).unwrap_err();
        assert!(matches!(err, SwapdError::MarketDataUnavailable(m) if m.contains("rate limit")));
    }

    #[test]
    fn price_body_is_read_by_quote_symbol() {
        let body: HashMap<String, serde_json::Value> = serde_json::from_str(r#"{"USD":1.87}"#).unwrap();
        assert_eq!(parse_price(&body, Coin::Usd).unwrap(), 1.87);
        assert!(matches!(
            parse_price(&body, Coin::Eth),
            Err(SwapdError::InvalidMarketData(_))
        ));

        let zero: HashMap<String, serde_json::Value> = serde_json::from_str(r#"{"USD":0}"#).unwrap();
        assert!(parse_price(&zero, Coin::Usd).is_err());
    }
}

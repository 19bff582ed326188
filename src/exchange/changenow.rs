//! ChangeNOW v1 REST client

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{pair_code, CreatedExchange, ExchangeBroker};
use crate::config::BrokerConfig;
use crate::domain::Coin;
use crate::error::{Result, SwapdError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinAmountResponse {
    min_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct CreateExchangeRequest<'a> {
    from: &'a str,
    to: &'a str,
    amount: Decimal,
    address: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExchangeResponse {
    id: String,
    payin_address: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct ChangeNowClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ChangeNowClient {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SwapdError::CapabilityUnavailable("broker.api_key is not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or(body);
        Err(SwapdError::Broker(format!("{} failed ({}): {}", what, status, detail)))
    }
}

#[async_trait]
impl ExchangeBroker for ChangeNowClient {
    async fn available_pairs(&self) -> Result<Vec<String>> {
        let url = format!("{}/market-info/available-pairs", self.api_url);
        let response = self
            .client
            .get(&url)
            .query(&[("includePartners", "false")])
            .send()
            .await?;
        let pairs: Vec<String> = Self::check(response, "available pairs").await?.json().await?;
        debug!("Broker lists {} pairs", pairs.len());
        Ok(pairs)
    }

    async fn min_amount(&self, from: Coin, to: Coin) -> Result<Decimal> {
        let url = format!("{}/min-amount/{}", self.api_url, pair_code(from, to)?);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;
        let body: MinAmountResponse = Self::check(response, "min amount").await?.json().await?;
        Ok(body.min_amount.unwrap_or(Decimal::ZERO))
    }

    async fn create_exchange(
        &self,
        from: Coin,
        to: Coin,
        amount: Decimal,
        destination: &str,
    ) -> Result<CreatedExchange> {
        let url = format!("{}/transactions/{}", self.api_url, self.api_key);
        let request = CreateExchangeRequest {
            from: from.require_exchange_code()?,
            to: to.require_exchange_code()?,
            amount,
            address: destination,
        };
        let response = self.client.post(&url).json(&request).send().await?;
        let body: CreateExchangeResponse =
            Self::check(response, "create exchange").await?.json().await?;

        if body.payin_address.trim().is_empty() {
            return Err(SwapdError::Broker(format!(
                "exchange {} came back without a deposit address",
                body.id
            )));
        }

        info!(exchange_id = %body.id, "Exchange {} -> {} created for {}", from, to, amount);
        Ok(CreatedExchange {
            id: body.id,
            deposit_address: body.payin_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn request_body_matches_broker_fields() {
        let request = CreateExchangeRequest {
            from: "eth",
            to: "waves",
            amount: dec!(0.0056),
            address: "3PWaves",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["from"], "eth");
        assert_eq!(json["address"], "3PWaves");
        assert_eq!(json["amount"].as_f64(), Some(0.0056));
    }

    #[test]
    fn missing_min_amount_reads_as_none() {
        let body: MinAmountResponse = serde_json::from_str(r#"{"minAmount":null}"#).unwrap();
        assert!(body.min_amount.is_none());
        let body: MinAmountResponse = serde_json::from_str(r#"{"minAmount":14.423}"#).unwrap();
        assert_eq!(body.min_amount, Some(dec!(14.423)));
    }

    #[test]
    fn client_needs_an_api_key() {
        let config = BrokerConfig {
            api_url: "https://api.changenow.io/v1".to_string(),
            api_key: None,
        };
        assert!(matches!(
            ChangeNowClient::new(&config),
            Err(SwapdError::CapabilityUnavailable(_))
        ));
    }
}

//! Waves wallet backed by a node that holds the account seed
//!
//! Transfers are signed by the node (`/transactions/sign`, API key
//! protected) and broadcast separately, so the transaction id is known
//! before any funds move.

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PreparedTransfer, TransferStatus, Wallet};
use crate::config::WavesWalletConfig;
use crate::domain::Coin;
use crate::error::{Result, SwapdError};

/// Wavelets per WAVES
const WAVELETS: i64 = 100_000_000;
/// Minimum fee of a transfer transaction, in wavelets
const TRANSFER_FEE: u64 = 100_000;

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: i64,
}

#[derive(Debug, Deserialize)]
struct SignedTransaction {
    id: String,
    amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusEntry {
    status: String,
    #[serde(default)]
    application_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionInfo {
    fee: i64,
}

#[derive(Debug, Deserialize)]
struct NodeError {
    #[serde(default)]
    message: Option<String>,
}

pub struct WavesNodeWallet {
    client: reqwest::Client,
    node_url: String,
    address: String,
    api_key: String,
}

impl WavesNodeWallet {
    pub fn new(config: &WavesWalletConfig) -> Result<Self> {
        if config.address.trim().is_empty() {
            return Err(SwapdError::Wallet("Waves address is not set".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        info!("Waves wallet initialized: {}", config.address);
        Ok(Self {
            client,
            node_url: config.node_url.trim_end_matches('/').to_string(),
            address: config.address.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

pub fn wavelets_to_waves(wavelets: i64) -> Decimal {
    Decimal::new(wavelets, 8).normalize()
}

pub fn waves_to_wavelets(amount: Decimal) -> Result<u64> {
    (amount * Decimal::from(WAVELETS))
        .trunc()
        .to_u64()
        .filter(|w| *w > 0)
        .ok_or_else(|| SwapdError::Wallet(format!("Invalid WAVES amount {}", amount)))
}

async fn node_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<NodeError>(&body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or(body);
    format!("{} ({})", message, status)
}

fn status_from_entry(entry: &StatusEntry) -> TransferStatus {
    match entry.status.as_str() {
        "confirmed" => match entry.application_status.as_deref() {
            Some("succeeded") | None => TransferStatus::Confirmed,
            Some(other) => TransferStatus::Failed(other.to_string()),
        },
        "unconfirmed" => TransferStatus::Pending,
        _ => TransferStatus::NotFound,
    }
}

#[async_trait]
impl Wallet for WavesNodeWallet {
    fn coin(&self) -> Coin {
        Coin::Waves
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn balance(&self) -> Result<Decimal> {
        let url = format!("{}/addresses/balance/{}", self.node_url, self.address);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SwapdError::Wallet(format!(
                "Balance query failed: {}",
                node_error_message(response).await
            )));
        }
        let body: BalanceResponse = response.json().await?;
        Ok(wavelets_to_waves(body.balance))
    }

    async fn prepare_transfer(&self, to: &str, amount: Decimal) -> Result<PreparedTransfer> {
        let wavelets = waves_to_wavelets(amount)?;
        let url = format!("{}/transactions/sign", self.node_url);
        let request = json!({
            "type": 4,
            "version": 2,
            "sender": self.address,
            "recipient": to,
            "amount": wavelets,
            "fee": TRANSFER_FEE,
        });

        let response = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SwapdError::Wallet(format!(
                "Signing failed: {}",
                node_error_message(response).await
            )));
        }

        let payload = response.text().await?;
        let signed: SignedTransaction = serde_json::from_str(&payload)?;
        debug!("Prepared Waves transfer {} to {}", signed.id, to);

        Ok(PreparedTransfer {
            tx_ref: signed.id,
            payload,
            to: to.to_string(),
            amount: wavelets_to_waves(signed.amount as i64),
        })
    }

    async fn broadcast(&self, prepared: &PreparedTransfer) -> Result<()> {
        let url = format!("{}/transactions/broadcast", self.node_url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(prepared.payload.clone())
            .send()
            .await
            .map_err(|e| SwapdError::TransferStatusUnknown(format!("{}: {}", prepared.tx_ref, e)))?;

        let status = response.status();
        if status.is_success() {
            info!("Broadcast {}", prepared.tx_ref);
            return Ok(());
        }

        let message = node_error_message(response).await;
        if message.to_ascii_lowercase().contains("already in the state") {
            warn!("{} already in the state", prepared.tx_ref);
            return Ok(());
        }
        if status == StatusCode::BAD_REQUEST {
            return Err(SwapdError::TransferRejected(format!("{}: {}", prepared.tx_ref, message)));
        }
        Err(SwapdError::TransferStatusUnknown(format!("{}: {}", prepared.tx_ref, message)))
    }

    async fn transfer_status(&self, tx_ref: &str) -> Result<TransferStatus> {
        let url = format!("{}/transactions/status", self.node_url);
        let response = self.client.get(&url).query(&[("id", tx_ref)]).send().await?;
        if !response.status().is_success() {
            return Err(SwapdError::Wallet(format!(
                "Status query failed: {}",
                node_error_message(response).await
            )));
        }
        let entries: Vec<StatusEntry> = response.json().await?;
        Ok(entries
            .first()
            .map(status_from_entry)
            .unwrap_or(TransferStatus::NotFound))
    }

    async fn transaction_fee(&self, tx_ref: &str) -> Result<Decimal> {
        let url = format!("{}/transactions/info/{}", self.node_url, tx_ref);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SwapdError::Wallet(format!(
                "Transaction info failed: {}",
                node_error_message(response).await
            )));
        }
        let info: TransactionInfo = response.json().await?;
        Ok(wavelets_to_waves(info.fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn wavelet_conversions() {
        assert_eq!(wavelets_to_waves(1_442_300_000), dec!(14.423));
        assert_eq!(wavelets_to_waves(100_000), dec!(0.001));
        assert_eq!(waves_to_wavelets(dec!(14.423)).unwrap(), 1_442_300_000);
        assert_eq!(waves_to_wavelets(dec!(0.000000019)).unwrap(), 1);
        assert!(waves_to_wavelets(dec!(0)).is_err());
        assert!(waves_to_wavelets(dec!(-1)).is_err());
    }

    #[test]
    fn node_statuses_map_to_transfer_status() {
        let parse = |raw: &str| status_from_entry(&serde_json::from_str::<StatusEntry>(raw).unwrap());
        assert_eq!(
            parse(r#"{"id":"a","status":"confirmed","height":1,"confirmations":3,"applicationStatus":"succeeded"}"#),
            TransferStatus::Confirmed
        );
        assert_eq!(parse(r#"{"id":"a","status":"unconfirmed"}"#), TransferStatus::Pending);
        assert_eq!(parse(r#"{"id":"a","status":"not_found"}"#), TransferStatus::NotFound);
        assert!(matches!(
            parse(r#"{"id":"a","status":"confirmed","applicationStatus":"script_execution_failed"}"#),
            TransferStatus::Failed(_)
        ));
    }
}

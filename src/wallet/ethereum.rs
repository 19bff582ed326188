//! Ethereum wallet over JSON-RPC

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionRequest, H256, U256, U64};
use ethers::utils::{format_ether, parse_ether};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use super::{PreparedTransfer, TransferStatus, Wallet};
use crate::config::EthereumWalletConfig;
use crate::domain::Coin;
use crate::error::{Result, SwapdError};

pub struct EthereumWallet {
    provider: Provider<Http>,
    signer: LocalWallet,
    chain_id: u64,
}

impl EthereumWallet {
    /// Connect to `rpc_url` and load the signing key. The key string is
    /// zeroized once parsed.
    pub fn new(config: &EthereumWalletConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| SwapdError::Wallet(format!("Invalid RPC url: {}", e)))?;

        let mut secure_key = config.private_key.trim_start_matches("0x").to_string();
        let parsed = secure_key.parse::<LocalWallet>();
        secure_key.zeroize();

        let signer = parsed
            .map_err(|e| SwapdError::Wallet(format!("Invalid private key: {}", e)))?
            .with_chain_id(config.chain_id);

        info!("Ethereum wallet initialized: {:?}", signer.address());

        Ok(Self {
            provider,
            signer,
            chain_id: config.chain_id,
        })
    }

    fn parse_hash(tx_ref: &str) -> Result<H256> {
        H256::from_str(tx_ref)
            .map_err(|e| SwapdError::Wallet(format!("Invalid transaction hash {}: {}", tx_ref, e)))
    }

    fn rpc_error(context: &str, e: ProviderError) -> SwapdError {
        SwapdError::Wallet(format!("{}: {}", context, e))
    }
}

/// Convert wei into a decimal ether amount
pub fn wei_to_eth(wei: U256) -> Result<Decimal> {
    Decimal::from_str(&format_ether(wei))
        .map_err(|e| SwapdError::Internal(format!("wei amount {} out of range: {}", wei, e)))
}

/// Nodes answer a rebroadcast of an already pooled transaction with an error.
fn already_submitted(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already known") || message.contains("known transaction")
}

#[async_trait]
impl Wallet for EthereumWallet {
    fn coin(&self) -> Coin {
        Coin::Eth
    }

    fn address(&self) -> String {
        format!("{:?}", self.signer.address())
    }

    async fn balance(&self) -> Result<Decimal> {
        let wei = self
            .provider
            .get_balance(self.signer.address(), None)
            .await
            .map_err(|e| Self::rpc_error("Balance query failed", e))?;
        wei_to_eth(wei)
    }

    async fn prepare_transfer(&self, to: &str, amount: Decimal) -> Result<PreparedTransfer> {
        let recipient = Address::from_str(to)
            .map_err(|e| SwapdError::Wallet(format!("Invalid recipient {}: {}", to, e)))?;
        let value = parse_ether(amount.to_string())
            .map_err(|e| SwapdError::Wallet(format!("Invalid amount {}: {}", amount, e)))?;

        let nonce = self
            .provider
            .get_transaction_count(self.signer.address(), Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| Self::rpc_error("Nonce query failed", e))?;

        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(self.signer.address())
            .to(recipient)
            .value(value)
            .nonce(nonce)
            .chain_id(self.chain_id)
            .into();
        self.provider
            .fill_transaction(&mut tx, None)
            .await
            .map_err(|e| Self::rpc_error("Failed to fill transaction", e))?;

        let signature = self
            .signer
            .sign_transaction(&tx)
            .await
            .map_err(|e| SwapdError::Wallet(format!("Failed to sign transaction: {}", e)))?;

        let raw = tx.rlp_signed(&signature);
        let hash = tx.hash(&signature);
        debug!("Prepared transfer {:?} of {} ETH to {}", hash, amount, to);

        Ok(PreparedTransfer {
            tx_ref: format!("{:?}", hash),
            payload: format!("0x{}", hex::encode(&raw)),
            to: format!("{:?}", recipient),
            amount: wei_to_eth(value)?,
        })
    }

    async fn broadcast(&self, prepared: &PreparedTransfer) -> Result<()> {
        let raw = Bytes::from_str(&prepared.payload).map_err(|e| {
            SwapdError::TransferRejected(format!("Corrupt payload for {}: {}", prepared.tx_ref, e))
        })?;

        match self.provider.send_raw_transaction(raw).await {
            Ok(pending) => {
                info!("Broadcast {:?}", pending.tx_hash());
                Ok(())
            }
            Err(e) => match e.as_error_response() {
                Some(rpc) if already_submitted(&rpc.message) => {
                    warn!("{} already submitted: {}", prepared.tx_ref, rpc.message);
                    Ok(())
                }
                // The node answered and refused the transaction.
                Some(rpc) => Err(SwapdError::TransferRejected(format!(
                    "{}: {} ({})",
                    prepared.tx_ref, rpc.message, rpc.code
                ))),
                None => Err(SwapdError::TransferStatusUnknown(format!(
                    "{}: {}",
                    prepared.tx_ref, e
                ))),
            },
        }
    }

    async fn transfer_status(&self, tx_ref: &str) -> Result<TransferStatus> {
        let hash = Self::parse_hash(tx_ref)?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| Self::rpc_error("Receipt query failed", e))?;

        if let Some(receipt) = receipt {
            return Ok(match receipt.status {
                Some(status) if status == U64::from(0) => {
                    TransferStatus::Failed("transaction reverted".to_string())
                }
                _ => TransferStatus::Confirmed,
            });
        }

        let known = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(|e| Self::rpc_error("Transaction query failed", e))?;

        Ok(if known.is_some() {
            TransferStatus::Pending
        } else {
            TransferStatus::NotFound
        })
    }

    async fn transaction_fee(&self, tx_ref: &str) -> Result<Decimal> {
        let hash = Self::parse_hash(tx_ref)?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| Self::rpc_error("Receipt query failed", e))?
            .ok_or_else(|| SwapdError::Wallet(format!("No receipt for {}", tx_ref)))?;

        let gas_used = receipt.gas_used.unwrap_or_default();
        let gas_price = match receipt.effective_gas_price {
            Some(price) => price,
            None => self
                .provider
                .get_transaction(hash)
                .await
                .map_err(|e| Self::rpc_error("Transaction query failed", e))?
                .and_then(|tx| tx.gas_price)
                .unwrap_or_default(),
        };

        wei_to_eth(gas_used * gas_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn config(key: &str) -> EthereumWalletConfig {
        EthereumWalletConfig {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            private_key: key.to_string(),
            chain_id: 1,
        }
    }

    #[test]
    fn loads_key_and_reports_checksum_free_address() {
        let wallet = EthereumWallet::new(&config(TEST_KEY)).unwrap();
        assert_eq!(wallet.coin(), Coin::Eth);
        assert_eq!(wallet.address(), "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23");
    }

    #[test]
    fn bad_key_is_a_wallet_error() {
        assert!(matches!(
            EthereumWallet::new(&config("not-a-key")),
            Err(SwapdError::Wallet(_))
        ));
    }

    #[test]
    fn gas_cost_converts_to_eth() {
        let fee = U256::from(21_000u64) * U256::from(20_000_000_000u64);
        assert_eq!(wei_to_eth(fee).unwrap(), dec!(0.00042));
    }

    #[test]
    fn rebroadcast_errors_are_recognised() {
        assert!(already_submitted("already known"));
        assert!(already_submitted("Known transaction: 0xabc"));
        assert!(!already_submitted("insufficient funds for gas * price + value"));
    }
}

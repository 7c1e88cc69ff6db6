//! Public chain access: gas pricing, receipts and the user's public wallet.

use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, H256, U256, U64};
use serde::Serialize;
use shieldswap_common::EvmGasType;
use tracing::debug;

use crate::engine::RawTransaction;
use crate::error::{ChainError, WalletError};

const DEFAULT_RECEIPT_POLL: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub tx_hash: H256,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Effective gas price: `eth_gasPrice` for legacy networks, the EIP-1559
    /// max fee per gas otherwise.
    async fn gas_price(&self, gas_type: EvmGasType) -> Result<U256, ChainError>;

    async fn wait_for_receipt(&self, tx_hash: H256, timeout: Duration) -> Result<Receipt, ChainError>;
}

/// The user's public wallet. Signing and sending may be refused by the user.
#[async_trait]
pub trait PublicWallet: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError>;

    async fn send_transaction(&self, tx: &RawTransaction) -> Result<H256, WalletError>;
}

/// [`ChainClient`] over an ethers HTTP provider.
pub struct EthersChainClient {
    provider: Provider<Http>,
    poll_interval: Duration,
}

impl EthersChainClient {
    pub fn new(rpc_url: &str) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|err| ChainError::InvalidUrl(format!("{}: {}", rpc_url, err)))?;
        Ok(Self {
            provider,
            poll_interval: DEFAULT_RECEIPT_POLL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn poll_receipt(&self, tx_hash: H256) -> Result<Receipt, ChainError> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|err| ChainError::Rpc(err.to_string()))?;
            if let Some(receipt) = receipt {
                let status = if receipt.status == Some(U64::from(1u64)) {
                    ReceiptStatus::Success
                } else {
                    ReceiptStatus::Reverted
                };
                return Ok(Receipt {
                    tx_hash,
                    status,
                    block_number: receipt.block_number.map(|n| n.as_u64()),
                    gas_used: receipt.gas_used,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn gas_price(&self, gas_type: EvmGasType) -> Result<U256, ChainError> {
        if gas_type.uses_max_fee() {
            let (max_fee, priority_fee) = self
                .provider
                .estimate_eip1559_fees(None)
                .await
                .map_err(|err| ChainError::Rpc(err.to_string()))?;
            debug!(%max_fee, %priority_fee, "eip-1559 fees");
            Ok(max_fee)
        } else {
            self.provider
                .get_gas_price()
                .await
                .map_err(|err| ChainError::Rpc(err.to_string()))
        }
    }

    async fn wait_for_receipt(&self, tx_hash: H256, timeout: Duration) -> Result<Receipt, ChainError> {
        tokio::time::timeout(timeout, self.poll_receipt(tx_hash))
            .await
            .map_err(|_| ChainError::ReceiptTimeout(tx_hash))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_rpc_url() {
        assert!(matches!(
            EthersChainClient::new("not a url"),
            Err(ChainError::InvalidUrl(_))
        ));
        assert!(EthersChainClient::new("http://127.0.0.1:8545").is_ok());
    }
}

//! Public-chain doubles: a chain client and a user wallet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use shieldswap_common::EvmGasType;
use shieldswap_engine::{ChainClient, ChainError, PublicWallet, RawTransaction, Receipt, ReceiptStatus, WalletError};

use crate::lock;

/// Gas price every network reports unless overridden: 2 wei.
pub const DEFAULT_GAS_PRICE: u64 = 2;

pub struct MockChainClient {
    gas_price: Mutex<U256>,
    status: Mutex<ReceiptStatus>,
    waited: Mutex<Vec<H256>>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self {
            gas_price: Mutex::new(U256::from(DEFAULT_GAS_PRICE)),
            status: Mutex::new(ReceiptStatus::Success),
            waited: Mutex::new(Vec::new()),
        }
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_gas_price(&self, price: U256) {
        *lock(&self.gas_price) = price;
    }

    /// Every following receipt reverts.
    pub fn revert_all(&self) {
        *lock(&self.status) = ReceiptStatus::Reverted;
    }

    /// Hashes whose receipts were awaited, in order.
    pub fn waited(&self) -> Vec<H256> {
        lock(&self.waited).clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn gas_price(&self, _gas_type: EvmGasType) -> Result<U256, ChainError> {
        Ok(*lock(&self.gas_price))
    }

    async fn wait_for_receipt(&self, tx_hash: H256, _timeout: Duration) -> Result<Receipt, ChainError> {
        lock(&self.waited).push(tx_hash);
        Ok(Receipt {
            tx_hash,
            status: *lock(&self.status),
            block_number: Some(1),
            gas_used: Some(U256::from(21_000u64)),
        })
    }
}

/// Hash the wallet reports for every sent transaction.
pub const WALLET_TX_HASH: H256 = H256::repeat_byte(0xab);

pub struct MockPublicWallet {
    address: Address,
    reject_signature: AtomicBool,
    reject_send: AtomicBool,
    sent: Mutex<Vec<RawTransaction>>,
}

impl MockPublicWallet {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reject_signature: AtomicBool::new(false),
            reject_send: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// The user declines the signature request.
    pub fn rejecting_signature(self) -> Self {
        self.reject_signature.store(true, Ordering::SeqCst);
        self
    }

    /// The user signs but declines to send.
    pub fn rejecting_send(self) -> Self {
        self.reject_send.store(true, Ordering::SeqCst);
        self
    }

    pub fn sent(&self) -> Vec<RawTransaction> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl PublicWallet for MockPublicWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        if self.reject_signature.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected);
        }
        let mut signature = self.address.as_bytes().to_vec();
        signature.extend_from_slice(message);
        Ok(signature)
    }

    async fn send_transaction(&self, tx: &RawTransaction) -> Result<H256, WalletError> {
        if self.reject_send.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected);
        }
        lock(&self.sent).push(tx.clone());
        Ok(WALLET_TX_HASH)
    }
}

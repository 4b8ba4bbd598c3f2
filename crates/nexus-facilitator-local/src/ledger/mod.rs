//! Virtual balance accounting and the transaction journal.
//!
//! [`LedgerStore`] is the only way balances change. Every mutation is atomic
//! per `(wallet, chain)` key:
//!
//! - [`LedgerStore::credit`] adds to a balance, creating it lazily.
//! - [`LedgerStore::try_debit`] checks and decrements in one step and never
//!   lets a balance go negative.
//! - [`LedgerStore::record_deposit`] claims the deposit hash, credits and
//!   journals as one unit; a hash is applied at most once.
//!
//! Two backends are provided: [`MemoryLedger`] and, with the `postgres`
//! feature, `PostgresLedger`.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::*;
#[cfg(feature = "postgres")]
pub use postgres::*;

use alloy_primitives::TxHash;
use nexus_types::chain::ChainId;
use nexus_types::proto::TransactionRecord;
use nexus_types::timestamp::UnixTimestamp;
use nexus_types::util::{WalletAddress, WeiAmount};

/// A confirmed on-chain deposit to be credited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub wallet: WalletAddress,
    pub chain_id: ChainId,
    pub amount: WeiAmount,
    pub tx_hash: TxHash,
    pub processed_at: UnixTimestamp,
}

/// A wallet's balance on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub chain_id: ChainId,
    pub balance: WeiAmount,
    pub last_updated: UnixTimestamp,
}

/// Journal filter. Results are newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionQuery {
    pub wallet: WalletAddress,
    pub chain_id: Option<ChainId>,
    pub limit: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: WeiAmount,
        available: WeiAmount,
    },
    #[error("Deposit {0} has already been processed")]
    DuplicateDeposit(TxHash),
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Balance overflow")]
    Overflow,
    #[error("Ledger backend error: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance, zero if the wallet never held funds on the chain.
    async fn balance(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
    ) -> Result<WeiAmount, LedgerError>;

    /// All balances of `wallet`, in ascending chain-id order.
    async fn balances(&self, wallet: WalletAddress) -> Result<Vec<BalanceSnapshot>, LedgerError>;

    /// Adds `amount` and returns the new balance.
    async fn credit(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
    ) -> Result<WeiAmount, LedgerError>;

    /// Subtracts `amount` if the balance covers it and returns the new balance.
    async fn try_debit(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
    ) -> Result<WeiAmount, LedgerError>;

    /// Applies a deposit exactly once per transaction hash.
    ///
    /// Credits the balance and journals a completed `deposit` entry. Returns
    /// [`LedgerError::DuplicateDeposit`] without any effect if the hash was
    /// seen before.
    async fn record_deposit(&self, deposit: &Deposit) -> Result<WeiAmount, LedgerError>;

    /// Appends a journal entry.
    async fn append(&self, record: &TransactionRecord) -> Result<(), LedgerError>;

    async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;
}

use alloy_primitives::TxHash;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use nexus_types::chain::ChainId;
use nexus_types::proto::{TransactionKind, TransactionRecord, TransactionStatus};
use nexus_types::timestamp::UnixTimestamp;
use nexus_types::util::{WalletAddress, WeiAmount};
use std::sync::{Mutex, PoisonError};

use super::{BalanceSnapshot, Deposit, LedgerError, LedgerStore, TransactionQuery};

#[derive(Debug, Clone, Copy, Default)]
struct BalanceEntry {
    balance: WeiAmount,
    last_updated: UnixTimestamp,
}

/// In-process ledger. State is lost on restart.
///
/// Each `(wallet, chain)` balance lives in its own [`DashMap`] entry, and
/// every read-modify-write happens while the entry's shard lock is held.
/// Deposits are claimed through the deposit map's `entry` API; the credit
/// runs while the vacant entry is still locked, so racing deposits with the
/// same hash serialize and only the first one applies.
///
/// Lock order is deposits, then balances, then journal.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: DashMap<(WalletAddress, ChainId), BalanceEntry>,
    deposits: DashMap<TxHash, Deposit>,
    journal: Mutex<Vec<TransactionRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn credit_entry(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
        now: UnixTimestamp,
    ) -> Result<WeiAmount, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let mut entry = self.balances.entry((wallet, chain_id)).or_default();
        let balance = entry
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        entry.balance = balance;
        entry.last_updated = now;
        Ok(balance)
    }

    fn debit_entry(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
    ) -> Result<WeiAmount, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let Some(mut entry) = self.balances.get_mut(&(wallet, chain_id)) else {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: WeiAmount::ZERO,
            });
        };
        let balance = entry
            .balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                required: amount,
                available: entry.balance,
            })?;
        entry.balance = balance;
        entry.last_updated = UnixTimestamp::now();
        Ok(balance)
    }

    fn push_journal(&self, record: TransactionRecord) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedger {
    async fn balance(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
    ) -> Result<WeiAmount, LedgerError> {
        Ok(self
            .balances
            .get(&(wallet, chain_id))
            .map(|entry| entry.balance)
            .unwrap_or_default())
    }

    async fn balances(&self, wallet: WalletAddress) -> Result<Vec<BalanceSnapshot>, LedgerError> {
        let mut snapshots = self
            .balances
            .iter()
            .filter(|entry| entry.key().0 == wallet)
            .map(|entry| BalanceSnapshot {
                chain_id: entry.key().1,
                balance: entry.balance,
                last_updated: entry.last_updated,
            })
            .collect::<Vec<_>>();
        snapshots.sort_by_key(|s| s.chain_id);
        Ok(snapshots)
    }

    async fn credit(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
    ) -> Result<WeiAmount, LedgerError> {
        self.credit_entry(wallet, chain_id, amount, UnixTimestamp::now())
    }

    async fn try_debit(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
        amount: WeiAmount,
    ) -> Result<WeiAmount, LedgerError> {
        self.debit_entry(wallet, chain_id, amount)
    }

    async fn record_deposit(&self, deposit: &Deposit) -> Result<WeiAmount, LedgerError> {
        match self.deposits.entry(deposit.tx_hash) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateDeposit(deposit.tx_hash)),
            Entry::Vacant(vacant) => {
                let new_balance = self.credit_entry(
                    deposit.wallet,
                    deposit.chain_id,
                    deposit.amount,
                    deposit.processed_at,
                )?;
                self.push_journal(TransactionRecord {
                    wallet: deposit.wallet,
                    kind: TransactionKind::Deposit,
                    chain_id: deposit.chain_id,
                    amount: deposit.amount,
                    counterparty: None,
                    tx_hash: Some(deposit.tx_hash),
                    timestamp: deposit.processed_at,
                    status: TransactionStatus::Completed,
                });
                vacant.insert(deposit.clone());
                Ok(new_balance)
            }
        }
    }

    async fn append(&self, record: &TransactionRecord) -> Result<(), LedgerError> {
        self.push_journal(record.clone());
        Ok(())
    }

    async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        let records = journal
            .iter()
            .rev()
            .filter(|r| r.wallet == query.wallet)
            .filter(|r| query.chain_id.is_none_or(|chain_id| r.chain_id == chain_id))
            .take(query.limit)
            .cloned()
            .collect();
        Ok(records)
    }
}

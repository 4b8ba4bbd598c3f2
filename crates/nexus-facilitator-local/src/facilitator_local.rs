//! The in-process facilitator: deposits, payments, balances and history.
//!
//! [`FacilitatorLocal`] owns the three collaborators a payment needs, all
//! built at startup and passed in explicitly:
//!
//! - a [`ChainRegistry`] to validate chain ids,
//! - a [`LedgerStore`] holding virtual balances and the journal,
//! - a [`SettlementRegistry`] mapping chains to on-chain settlement backends.
//!
//! # Payment flow
//!
//! A payment is checked (`amount > 0`, chain supported), then debited
//! atomically. If the chain has a settlement backend the transfer is sent and
//! confirmed within the settlement timeout; on any failure the debit is
//! credited back and a `failed` journal entry is written. Without a backend
//! the payment is simulated with a random transaction hash.
//!
//! ```ignore
//! use nexus_facilitator_local::{FacilitatorLocal, ledger::MemoryLedger};
//! use nexus_types::settlement::SettlementRegistry;
//!
//! let facilitator = FacilitatorLocal::new(chains, Arc::new(MemoryLedger::new()), SettlementRegistry::new());
//! let receipt = facilitator.pay(&request).await?;
//! ```

use alloy_primitives::TxHash;
use nexus_types::chain::{ChainId, ChainNotFound, ChainRegistry};
use nexus_types::facilitator::Facilitator;
use nexus_types::proto::{
    ChainBalance, ChainBalanceResponse, DepositRequest, DepositResponse, ErrorKind, PayRequest,
    PayResponse, SettlementMode, SupportedChain, SupportedChainsResponse, TransactionKind,
    TransactionRecord, TransactionStatus, TransactionView, TransactionsResponse,
    UNKNOWN_CHAIN_NAME, UNKNOWN_CHAIN_SYMBOL, WalletBalancesResponse,
};
use nexus_types::settlement::{SettlementError, SettlementRegistry};
use nexus_types::timestamp::UnixTimestamp;
use nexus_types::util::{WalletAddress, WeiAmount};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::ledger::{Deposit, LedgerError, LedgerStore, TransactionQuery};

/// Upper bound on one on-chain settlement, submission to confirmation.
pub const DEFAULT_SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(60);
/// Journal page size when no limit is given.
pub const DEFAULT_TRANSACTIONS_LIMIT: usize = 50;
/// Largest journal page a caller may request.
pub const MAX_TRANSACTIONS_LIMIT: usize = 500;

pub struct FacilitatorLocal {
    chains: Arc<ChainRegistry>,
    ledger: Arc<dyn LedgerStore>,
    settlement: SettlementRegistry,
    settlement_timeout: Duration,
}

impl FacilitatorLocal {
    pub fn new(
        chains: Arc<ChainRegistry>,
        ledger: Arc<dyn LedgerStore>,
        settlement: SettlementRegistry,
    ) -> Self {
        Self {
            chains,
            ledger,
            settlement,
            settlement_timeout: DEFAULT_SETTLEMENT_TIMEOUT,
        }
    }

    pub fn with_settlement_timeout(mut self, timeout: Duration) -> Self {
        self.settlement_timeout = timeout;
        self
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    /// `true` when no chain settles on-chain.
    pub fn is_demo_mode(&self) -> bool {
        self.settlement.is_demo_mode()
    }

    fn chain_labels(&self, chain_id: ChainId) -> (String, String) {
        match self.chains.config_for(chain_id) {
            Ok(chain) => (chain.name.clone(), chain.native_symbol.clone()),
            Err(_) => (
                UNKNOWN_CHAIN_NAME.to_string(),
                UNKNOWN_CHAIN_SYMBOL.to_string(),
            ),
        }
    }

    /// Balances of `wallet` on every chain it ever held funds on.
    #[instrument(skip_all, fields(wallet = %wallet))]
    pub async fn balances(
        &self,
        wallet: WalletAddress,
    ) -> Result<WalletBalancesResponse, FacilitatorLocalError> {
        let snapshots = self.ledger.balances(wallet).await?;
        let balances = snapshots
            .into_iter()
            .map(|snapshot| {
                let (chain_name, symbol) = self.chain_labels(snapshot.chain_id);
                let balance = ChainBalance {
                    virtual_balance: snapshot.balance,
                    chain_name,
                    symbol,
                    last_updated: snapshot.last_updated,
                };
                (snapshot.chain_id, balance)
            })
            .collect();
        Ok(WalletBalancesResponse {
            success: true,
            wallet,
            balances,
        })
    }

    #[instrument(skip_all, fields(wallet = %wallet, chain = %chain_id))]
    pub async fn balance(
        &self,
        wallet: WalletAddress,
        chain_id: ChainId,
    ) -> Result<ChainBalanceResponse, FacilitatorLocalError> {
        let chain = self.chains.config_for(chain_id)?;
        let balance = self.ledger.balance(wallet, chain_id).await?;
        Ok(ChainBalanceResponse {
            success: true,
            wallet,
            chain_id,
            chain_name: chain.name.clone(),
            symbol: chain.native_symbol.clone(),
            virtual_balance: balance,
            virtual_balance_formatted: balance.format_ether(),
        })
    }

    /// Credits a confirmed on-chain deposit, at most once per transaction hash.
    ///
    /// The deposit transaction itself is not inspected on chain.
    #[instrument(skip_all, fields(wallet = %request.wallet, chain = %request.chain_id, tx = %request.tx_hash))]
    pub async fn deposit(
        &self,
        request: &DepositRequest,
    ) -> Result<DepositResponse, FacilitatorLocalError> {
        if request.amount.is_zero() {
            return Err(FacilitatorLocalError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }
        self.chains.config_for(request.chain_id)?;
        let deposit = Deposit {
            wallet: request.wallet,
            chain_id: request.chain_id,
            amount: request.amount,
            tx_hash: request.tx_hash,
            processed_at: UnixTimestamp::now(),
        };
        let new_balance = self.ledger.record_deposit(&deposit).await?;
        tracing::info!(amount = %request.amount, %new_balance, "Deposit credited");
        Ok(DepositResponse {
            success: true,
            tx_hash: request.tx_hash,
            wallet: request.wallet,
            chain_id: request.chain_id,
            amount: request.amount,
            amount_formatted: request.amount.format_ether(),
            new_balance,
        })
    }

    /// Journal entries of `wallet`, newest first.
    ///
    /// A `limit` of `None` or `0` means [`DEFAULT_TRANSACTIONS_LIMIT`]; larger
    /// values are clamped to [`MAX_TRANSACTIONS_LIMIT`].
    #[instrument(skip_all, fields(wallet = %wallet))]
    pub async fn transactions(
        &self,
        wallet: WalletAddress,
        chain_id: Option<ChainId>,
        limit: Option<usize>,
    ) -> Result<TransactionsResponse, FacilitatorLocalError> {
        let limit = match limit {
            None | Some(0) => DEFAULT_TRANSACTIONS_LIMIT,
            Some(limit) => limit.min(MAX_TRANSACTIONS_LIMIT),
        };
        let query = TransactionQuery {
            wallet,
            chain_id,
            limit,
        };
        let records = self.ledger.transactions(&query).await?;
        let transactions = records
            .into_iter()
            .map(|record| {
                let (chain_name, symbol) = self.chain_labels(record.chain_id);
                TransactionView {
                    amount_formatted: record.amount.format_ether(),
                    chain_name,
                    symbol,
                    record,
                }
            })
            .collect::<Vec<_>>();
        Ok(TransactionsResponse {
            success: true,
            wallet,
            count: transactions.len(),
            transactions,
        })
    }

    async fn journal_payment(
        &self,
        request: &PayRequest,
        tx_hash: Option<TxHash>,
        status: TransactionStatus,
    ) -> Result<(), LedgerError> {
        let record = TransactionRecord {
            wallet: request.wallet,
            kind: TransactionKind::Payment,
            chain_id: request.chain_id,
            amount: request.amount,
            counterparty: Some(request.provider),
            tx_hash,
            timestamp: UnixTimestamp::now(),
            status,
        };
        self.ledger.append(&record).await
    }

    /// Credits a failed settlement back and records the failure.
    async fn compensate(&self, request: &PayRequest, error: &SettlementError) {
        if let Err(credit_error) = self
            .ledger
            .credit(request.wallet, request.chain_id, request.amount)
            .await
        {
            tracing::error!(
                wallet = %request.wallet,
                chain = %request.chain_id,
                amount = %request.amount,
                error = %credit_error,
                "Compensating credit failed after settlement failure, balance needs reconciliation"
            );
        }
        if let Err(journal_error) = self
            .journal_payment(request, error.tx_hash(), TransactionStatus::Failed)
            .await
        {
            tracing::error!(error = %journal_error, "Failed to journal failed payment");
        }
    }
}

impl Facilitator for FacilitatorLocal {
    type Error = FacilitatorLocalError;

    #[instrument(skip_all, fields(wallet = %request.wallet, chain = %request.chain_id, amount = %request.amount))]
    async fn pay(&self, request: &PayRequest) -> Result<PayResponse, Self::Error> {
        if request.amount.is_zero() {
            return Err(FacilitatorLocalError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }
        self.chains.config_for(request.chain_id)?;

        let new_balance = self
            .ledger
            .try_debit(request.wallet, request.chain_id, request.amount)
            .await?;

        let (tx_hash, settlement) = match self.settlement.by_chain_id(request.chain_id) {
            Some(backend) => {
                let transfer = backend.transfer_native(request.provider, request.amount);
                let result = match tokio::time::timeout(self.settlement_timeout, transfer).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(
                            wallet = %request.wallet,
                            chain = %request.chain_id,
                            amount = %request.amount,
                            provider = %request.provider,
                            timeout = ?self.settlement_timeout,
                            "Settlement timed out, the transfer may still land on-chain and must be reconciled"
                        );
                        Err(SettlementError::Timeout(self.settlement_timeout))
                    }
                };
                match result {
                    Ok(tx_hash) => (tx_hash, SettlementMode::Onchain),
                    Err(error) => {
                        tracing::warn!(%error, provider = %request.provider, "Settlement failed, reversing debit");
                        self.compensate(request, &error).await;
                        return Err(FacilitatorLocalError::Settlement(error));
                    }
                }
            }
            None => {
                let tx_hash = TxHash::from(rand::rng().random::<[u8; 32]>());
                (tx_hash, SettlementMode::Simulated)
            }
        };

        if let Err(error) = self
            .journal_payment(request, Some(tx_hash), TransactionStatus::Completed)
            .await
        {
            tracing::error!(%error, tx = %tx_hash, "Failed to journal settled payment");
        }
        tracing::info!(tx = %tx_hash, ?settlement, provider = %request.provider, "Payment settled");

        Ok(PayResponse {
            success: true,
            tx_hash,
            amount_paid: request.amount,
            amount_formatted: request.amount.format_ether(),
            new_balance,
            new_balance_formatted: new_balance.format_ether(),
            settlement,
        })
    }

    async fn supported_chains(&self) -> Result<SupportedChainsResponse, Self::Error> {
        Ok(SupportedChainsResponse {
            success: true,
            chains: self.chains.iter().map(SupportedChain::from).collect(),
        })
    }
}

/// Errors that can occur during local facilitator operations.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    /// Missing or malformed input. Nothing was changed.
    #[error("{0}")]
    Validation(String),
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: WeiAmount,
        available: WeiAmount,
    },
    #[error("Deposit {0} has already been processed")]
    DuplicateDeposit(TxHash),
    #[error("Chain {0} is not supported")]
    ChainUnsupported(ChainId),
    /// The on-chain transfer failed. The debit has been reversed.
    #[error("Settlement failed: {0}")]
    Settlement(#[source] SettlementError),
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl FacilitatorLocalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FacilitatorLocalError::Validation(_) => ErrorKind::ValidationError,
            FacilitatorLocalError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            FacilitatorLocalError::DuplicateDeposit(_) => ErrorKind::DuplicateDeposit,
            FacilitatorLocalError::ChainUnsupported(_) => ErrorKind::ChainUnsupported,
            FacilitatorLocalError::Settlement(_) => ErrorKind::SettlementFailure,
            FacilitatorLocalError::Ledger(_) => ErrorKind::InternalError,
        }
    }
}

impl From<LedgerError> for FacilitatorLocalError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientBalance {
                required,
                available,
            } => FacilitatorLocalError::InsufficientBalance {
                required,
                available,
            },
            LedgerError::DuplicateDeposit(tx_hash) => {
                FacilitatorLocalError::DuplicateDeposit(tx_hash)
            }
            LedgerError::ZeroAmount => {
                FacilitatorLocalError::Validation("Amount must be greater than zero".to_string())
            }
            LedgerError::Overflow => FacilitatorLocalError::Validation(
                "Amount would overflow the balance".to_string(),
            ),
            LedgerError::Backend(message) => FacilitatorLocalError::Ledger(message),
        }
    }
}

impl From<ChainNotFound> for FacilitatorLocalError {
    fn from(value: ChainNotFound) -> Self {
        FacilitatorLocalError::ChainUnsupported(value.0)
    }
}

//! JSON wire types.
//!
//! - The facilitator API (`/deposit`, `/pay`, `/balance`, `/transactions`,
//!   `/supported-chains`) lives at the top level of this module.
//! - Payment challenges and proofs exchanged with resource servers live in [`x402`].
//!
//! Field names are camelCase on the wire; amounts are decimal strings in the
//! smallest native unit, with `*Formatted` companions for display.

pub mod x402;

use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::chain::{ChainConfig, ChainId};
use crate::timestamp::UnixTimestamp;
use crate::util::{WalletAddress, WeiAmount};

/// Display name used for journal entries whose chain is no longer configured.
pub const UNKNOWN_CHAIN_NAME: &str = "Unknown";
/// Symbol used for journal entries whose chain is no longer configured.
pub const UNKNOWN_CHAIN_SYMBOL: &str = "TOKEN";

/// `POST /deposit` body: a confirmed on-chain deposit to credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub wallet: WalletAddress,
    pub chain_id: ChainId,
    pub amount: WeiAmount,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub success: bool,
    pub tx_hash: TxHash,
    pub wallet: WalletAddress,
    pub chain_id: ChainId,
    pub amount: WeiAmount,
    pub amount_formatted: String,
    pub new_balance: WeiAmount,
}

/// `POST /pay` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    /// Wallet whose virtual balance is debited.
    pub wallet: WalletAddress,
    /// Payee receiving the settlement.
    pub provider: Address,
    pub amount: WeiAmount,
    pub chain_id: ChainId,
}

/// How a payment reached the payee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// A confirmed native transfer.
    Onchain,
    /// Demo mode: the ledger was debited, nothing was sent.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayResponse {
    pub success: bool,
    pub tx_hash: TxHash,
    pub amount_paid: WeiAmount,
    pub amount_formatted: String,
    pub new_balance: WeiAmount,
    pub new_balance_formatted: String,
    pub settlement: SettlementMode,
}

/// Stable machine-readable error kinds returned by the facilitator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    InsufficientBalance,
    DuplicateDeposit,
    ChainUnsupported,
    SettlementFailure,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::DuplicateDeposit => "DuplicateDeposit",
            ErrorKind::ChainUnsupported => "ChainUnsupported",
            ErrorKind::SettlementFailure => "SettlementFailure",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(s)
    }
}

/// Error body: `{"success": false, "error": "<Kind>", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<WeiAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<WeiAmount>,
}

impl ErrorResponse {
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error,
            message: message.into(),
            required: None,
            available: None,
        }
    }
}

/// One chain's entry in `GET /balance/{wallet}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalance {
    #[serde(rename = "virtual")]
    pub virtual_balance: WeiAmount,
    pub chain_name: String,
    pub symbol: String,
    pub last_updated: UnixTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalancesResponse {
    pub success: bool,
    pub wallet: WalletAddress,
    pub balances: BTreeMap<ChainId, ChainBalance>,
}

/// `GET /balance/{wallet}/{chainId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalanceResponse {
    pub success: bool,
    pub wallet: WalletAddress,
    pub chain_id: ChainId,
    pub chain_name: String,
    pub symbol: String,
    pub virtual_balance: WeiAmount,
    pub virtual_balance_formatted: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Payment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Payment => "payment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

/// An immutable journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub wallet: WalletAddress,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub chain_id: ChainId,
    pub amount: WeiAmount,
    /// Payee for payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<Address>,
    /// Absent for a payment whose settlement never reached the chain.
    pub tx_hash: Option<TxHash>,
    pub timestamp: UnixTimestamp,
    pub status: TransactionStatus,
}

/// Journal entry decorated for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub amount_formatted: String,
    pub chain_name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub success: bool,
    pub wallet: WalletAddress,
    pub count: usize,
    pub transactions: Vec<TransactionView>,
}

/// One entry of `GET /supported-chains`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedChain {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc: Url,
    pub symbol: String,
}

impl From<&ChainConfig> for SupportedChain {
    fn from(chain: &ChainConfig) -> Self {
        Self {
            chain_id: chain.chain_id,
            name: chain.name.clone(),
            rpc: chain.rpc.http.clone(),
            symbol: chain.native_symbol.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedChainsResponse {
    pub success: bool,
    pub chains: Vec<SupportedChain>,
}

impl SupportedChainsResponse {
    pub fn supports(&self, chain_id: ChainId) -> bool {
        self.chains.iter().any(|c| c.chain_id == chain_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: UnixTimestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pay_request_wire_format() {
        let request: PayRequest = serde_json::from_value(json!({
            "wallet": "0xAbCdEf0000000000000000000000000000000001",
            "provider": "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123",
            "amount": "100000000000000000",
            "chainId": 240
        }))
        .unwrap();
        assert_eq!(
            request.wallet.to_string(),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(request.chain_id, ChainId::new(240));
        assert_eq!(request.amount, WeiAmount::from(100_000_000_000_000_000));
    }

    #[test]
    fn test_pay_request_rejects_fractional_amount() {
        let result = serde_json::from_value::<PayRequest>(json!({
            "wallet": "0xabcdef0000000000000000000000000000000001",
            "provider": "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123",
            "amount": "0.1",
            "chainId": 240
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_deposit_request_normalizes_tx_hash() {
        let request: DepositRequest = serde_json::from_value(json!({
            "wallet": "0xabcdef0000000000000000000000000000000001",
            "chainId": "84532",
            "amount": "5",
            "txHash": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"
        }))
        .unwrap();
        let serialized = serde_json::to_value(&request).unwrap();
        assert_eq!(
            serialized["txHash"],
            json!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn test_error_response_shape() {
        let mut response = ErrorResponse::new(ErrorKind::InsufficientBalance, "not enough");
        response.required = Some(WeiAmount::from(10));
        response.available = Some(WeiAmount::from(3));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": false,
                "error": "InsufficientBalance",
                "message": "not enough",
                "required": "10",
                "available": "3"
            })
        );
    }

    #[test]
    fn test_transaction_view_flattens_record() {
        let view = TransactionView {
            record: TransactionRecord {
                wallet: "0xabcdef0000000000000000000000000000000001".parse().unwrap(),
                kind: TransactionKind::Deposit,
                chain_id: ChainId::new(240),
                amount: WeiAmount::from(1_000_000_000_000_000_000),
                counterparty: None,
                tx_hash: Some(TxHash::ZERO),
                timestamp: UnixTimestamp::from_millis(1),
                status: TransactionStatus::Completed,
            },
            amount_formatted: "1.0".to_string(),
            chain_name: "Cronos zkEVM Testnet".to_string(),
            symbol: "zkCRO".to_string(),
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["type"], json!("deposit"));
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["amountFormatted"], json!("1.0"));
        assert!(value.get("counterparty").is_none());
    }
}

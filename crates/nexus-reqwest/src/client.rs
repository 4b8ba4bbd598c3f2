//! The challenge, pay and retry cycle.
//!
//! ```text
//! request ──► 2xx ─────────────────────────────────────────► unlocked (free)
//!    │
//!    └──────► 402 ─► parse challenge ─► pay ─► retry ─► 2xx ─► unlocked (paid)
//!                                                   └─► other ─► paid but locked
//! ```
//!
//! A request is retried at most once. There is no second challenge round.

use alloy_primitives::{Address, TxHash};
use http::header::InvalidHeaderValue;
use http::{HeaderValue, StatusCode};
use nexus_types::chain::ChainId;
use nexus_types::facilitator::Facilitator;
use nexus_types::networks::DEFAULT_CHAIN;
use nexus_types::proto::PayRequest;
use nexus_types::proto::x402::{PAYMENT_HEADER, PaymentChallenge, PaymentProof};
use nexus_types::util::{WalletAddress, WeiAmount};
use reqwest::{Client, IntoUrl, Request, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::challenge::{ChallengeError, parse_challenge};

/// What a successful payment bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub tx_hash: TxHash,
    pub chain_id: ChainId,
    pub cost: WeiAmount,
    pub payee: Address,
}

impl PaymentReceipt {
    /// The `X-PAYMENT` token proving this payment.
    pub fn proof(&self) -> PaymentProof {
        PaymentProof {
            tx_hash: self.tx_hash,
            chain_id: self.chain_id,
        }
    }
}

/// Body of an unlocked resource.
///
/// Serializes as `{"data": ..., "txHash": "0x...", "cost": "...", "costFormatted": "..."}`.
/// Free resources have no `txHash` and a cost of `"0"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedResource {
    /// The JSON body, or the text body as a JSON string.
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    pub cost: WeiAmount,
    pub cost_formatted: String,
}

impl UnlockedResource {
    fn free(data: Value) -> Self {
        Self {
            data,
            tx_hash: None,
            cost: WeiAmount::ZERO,
            cost_formatted: WeiAmount::ZERO.format_ether(),
        }
    }

    fn paid(data: Value, receipt: &PaymentReceipt) -> Self {
        Self {
            data,
            tx_hash: Some(receipt.tx_hash),
            cost: receipt.cost,
            cost_formatted: receipt.cost.format_ether(),
        }
    }
}

/// How far an x402 request got before it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStage {
    /// No funds moved.
    PaymentNotAttempted,
    /// The facilitator refused or failed the payment.
    PaymentFailed,
    /// Funds moved but the resource stayed locked.
    PaidButLocked,
}

#[derive(Debug, thiserror::Error)]
pub enum X402Error<E> {
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
    #[error("Unsupported asset type {0}: only native payments are settled")]
    UnsupportedAsset(String),
    #[error("Payment amount {requested} exceeds maximum allowed {allowed}")]
    PaymentAmountTooLarge {
        requested: WeiAmount,
        allowed: WeiAmount,
    },
    #[error("Payment failed: {0}")]
    Payment(#[source] E),
    #[error("Payment {} settled but the proof header is invalid: {source}", .receipt.tx_hash)]
    ProofHeader {
        receipt: PaymentReceipt,
        #[source]
        source: InvalidHeaderValue,
    },
    #[error("Payment {} settled but retrying the request failed: {source}", .receipt.tx_hash)]
    RetryFailed {
        receipt: PaymentReceipt,
        #[source]
        source: reqwest::Error,
    },
    #[error("Payment {} settled but access was denied with status {status}: {body}", .receipt.tx_hash)]
    AccessDenied {
        receipt: PaymentReceipt,
        status: StatusCode,
        body: String,
    },
}

impl<E> X402Error<E> {
    pub fn stage(&self) -> PaymentStage {
        match self {
            X402Error::Request(_)
            | X402Error::RequestNotCloneable
            | X402Error::UnexpectedStatus { .. }
            | X402Error::Challenge(_)
            | X402Error::UnsupportedAsset(_)
            | X402Error::PaymentAmountTooLarge { .. } => PaymentStage::PaymentNotAttempted,
            X402Error::Payment(_) => PaymentStage::PaymentFailed,
            X402Error::ProofHeader { .. }
            | X402Error::RetryFailed { .. }
            | X402Error::AccessDenied { .. } => PaymentStage::PaidButLocked,
        }
    }

    /// The settled payment, for errors raised after funds moved.
    pub fn receipt(&self) -> Option<&PaymentReceipt> {
        match self {
            X402Error::ProofHeader { receipt, .. }
            | X402Error::RetryFailed { receipt, .. }
            | X402Error::AccessDenied { receipt, .. } => Some(receipt),
            _ => None,
        }
    }
}

/// HTTP client that pays x402 challenges out of a wallet's virtual balance.
#[derive(Clone, Debug)]
pub struct X402Client<F> {
    http: Client,
    facilitator: F,
    wallet: WalletAddress,
    default_chain: ChainId,
    max_amount: Option<WeiAmount>,
}

impl<F> X402Client<F> {
    /// Pays from `wallet` through `facilitator`. Challenges without a chain
    /// id settle on Cronos zkEVM Testnet.
    pub fn new(facilitator: F, wallet: WalletAddress) -> Self {
        Self {
            http: Client::new(),
            facilitator,
            wallet,
            default_chain: DEFAULT_CHAIN,
            max_amount: None,
        }
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_default_chain(mut self, chain_id: ChainId) -> Self {
        self.default_chain = chain_id;
        self
    }

    /// Refuses challenges costing more than `max_amount`.
    pub fn with_max_amount(mut self, max_amount: WeiAmount) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    pub fn wallet(&self) -> WalletAddress {
        self.wallet
    }

    pub fn default_chain(&self) -> ChainId {
        self.default_chain
    }

    pub fn facilitator(&self) -> &F {
        &self.facilitator
    }
}

impl<F> X402Client<F>
where
    F: Facilitator + Sync,
{
    /// `GET`s `url`, paying for it if asked to.
    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<UnlockedResource, X402Error<F::Error>> {
        self.fetch(self.http.get(url)).await
    }

    /// Sends `request`, paying for it if asked to.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.client.fetch", skip_all, fields(wallet = %self.wallet), err)
    )]
    pub async fn fetch(
        &self,
        request: RequestBuilder,
    ) -> Result<UnlockedResource, X402Error<F::Error>> {
        let request = request.build().map_err(X402Error::Request)?;
        let retry = request
            .try_clone()
            .ok_or(X402Error::RequestNotCloneable)?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(X402Error::Request)?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(%status, "No payment required");
            let data = read_data(response).await.map_err(X402Error::Request)?;
            return Ok(UnlockedResource::free(data));
        }
        if status != StatusCode::PAYMENT_REQUIRED {
            let body = response.text().await.unwrap_or_default();
            return Err(X402Error::UnexpectedStatus { status, body });
        }
        let challenge = self.read_challenge(response).await?;
        let receipt = self.pay_challenge(&challenge).await?;
        self.retry(retry, receipt).await
    }

    /// Parses the payment terms out of a `402` response.
    pub async fn read_challenge(
        &self,
        response: Response,
    ) -> Result<PaymentChallenge, X402Error<F::Error>> {
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(X402Error::Request)?;
        let body = serde_json::from_slice::<Value>(&bytes).ok();
        let challenge = parse_challenge(&headers, body.as_ref(), self.default_chain)?;
        Ok(challenge)
    }

    /// Pays `challenge` through the facilitator.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.client.pay", skip_all, fields(
            payee = %challenge.payee,
            cost = %challenge.cost,
            chain = %challenge.chain_id,
        ), err)
    )]
    pub async fn pay_challenge(
        &self,
        challenge: &PaymentChallenge,
    ) -> Result<PaymentReceipt, X402Error<F::Error>> {
        if !challenge.is_native() {
            return Err(X402Error::UnsupportedAsset(challenge.asset_type.clone()));
        }
        if let Some(allowed) = self.max_amount
            && challenge.cost > allowed
        {
            return Err(X402Error::PaymentAmountTooLarge {
                requested: challenge.cost,
                allowed,
            });
        }
        let request = PayRequest {
            wallet: self.wallet,
            provider: challenge.payee,
            amount: challenge.cost,
            chain_id: challenge.chain_id,
        };
        let response = self
            .facilitator
            .pay(&request)
            .await
            .map_err(X402Error::Payment)?;
        tracing::info!(
            tx_hash = %response.tx_hash,
            payee = %challenge.payee,
            cost = %challenge.cost,
            chain = %challenge.chain_id,
            "Paid x402 challenge"
        );
        Ok(PaymentReceipt {
            tx_hash: response.tx_hash,
            chain_id: challenge.chain_id,
            cost: challenge.cost,
            payee: challenge.payee,
        })
    }

    async fn retry(
        &self,
        mut request: Request,
        receipt: PaymentReceipt,
    ) -> Result<UnlockedResource, X402Error<F::Error>> {
        attach_proof(&mut request, &receipt)
            .map_err(|source| X402Error::ProofHeader { receipt, source })?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|source| X402Error::RetryFailed { receipt, source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(tx_hash = %receipt.tx_hash, %status, "Paid request was not unlocked");
            return Err(X402Error::AccessDenied {
                receipt,
                status,
                body,
            });
        }
        let data = read_data(response)
            .await
            .map_err(|source| X402Error::RetryFailed { receipt, source })?;
        Ok(UnlockedResource::paid(data, &receipt))
    }
}

/// Adds the `X-PAYMENT: <txHash>:<chainId>` header for `receipt`.
pub fn attach_proof(
    request: &mut Request,
    receipt: &PaymentReceipt,
) -> Result<(), InvalidHeaderValue> {
    let value = HeaderValue::from_str(&receipt.proof().to_string())?;
    request.headers_mut().insert(PAYMENT_HEADER, value);
    Ok(())
}

async fn read_data(response: Response) -> Result<Value, reqwest::Error> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    let data = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    Ok(data)
}

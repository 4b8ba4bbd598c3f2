//! HTTP endpoints implemented by the Nexus facilitator.
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/health` | [`HealthResponse`] |
//! | `GET` | `/balance/{wallet}` | [`WalletBalancesResponse`](nexus_types::proto::WalletBalancesResponse) |
//! | `GET` | `/balance/{wallet}/{chainId}` | [`ChainBalanceResponse`](nexus_types::proto::ChainBalanceResponse) |
//! | `POST` | `/deposit` | [`DepositResponse`](nexus_types::proto::DepositResponse) |
//! | `POST` | `/pay` | [`PayResponse`](nexus_types::proto::PayResponse) |
//! | `GET` | `/transactions/{wallet}?limit&chainId` | [`TransactionsResponse`](nexus_types::proto::TransactionsResponse) |
//! | `GET` | `/supported-chains` | [`SupportedChainsResponse`](nexus_types::proto::SupportedChainsResponse) |
//!
//! Failures are returned as [`ErrorResponse`] bodies with `success: false`.
//! Malformed paths, queries and JSON bodies are reported as `ValidationError`
//! rather than with axum's default plain-text rejections.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nexus_types::chain::ChainId;
use nexus_types::facilitator::Facilitator;
use nexus_types::proto::{
    DepositRequest, ErrorKind, ErrorResponse, HealthResponse, PayRequest,
};
use nexus_types::timestamp::UnixTimestamp;
use nexus_types::util::WalletAddress;
use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

use crate::facilitator_local::{FacilitatorLocal, FacilitatorLocalError};

/// Name reported by `GET /health`.
pub const SERVICE_NAME: &str = "nexus-facilitator";

pub fn routes() -> Router<Arc<FacilitatorLocal>> {
    Router::new()
        .route("/health", get(get_health))
        .route("/balance/{wallet}", get(get_balances))
        .route("/balance/{wallet}/{chain_id}", get(get_chain_balance))
        .route("/deposit", post(post_deposit))
        .route("/pay", post(post_pay))
        .route("/transactions/{wallet}", get(get_transactions))
        .route("/supported-chains", get(get_supported_chains))
}

fn parse_param<T>(name: &str, value: &str) -> Result<T, FacilitatorLocalError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| FacilitatorLocalError::Validation(format!("Invalid {name}: {e}")))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, FacilitatorLocalError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| FacilitatorLocalError::Validation(rejection.body_text()))
}

/// `GET /health`: liveness check.
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        timestamp: UnixTimestamp::now(),
    })
}

/// `GET /balance/{wallet}`: virtual balances of a wallet on every chain it has used.
#[instrument(skip_all)]
pub async fn get_balances(
    State(facilitator): State<Arc<FacilitatorLocal>>,
    Path(wallet): Path<String>,
) -> Result<impl IntoResponse, FacilitatorLocalError> {
    let wallet: WalletAddress = parse_param("wallet", &wallet)?;
    let response = facilitator.balances(wallet).await?;
    Ok(Json(response))
}

/// `GET /balance/{wallet}/{chainId}`: virtual balance on one chain.
#[instrument(skip_all)]
pub async fn get_chain_balance(
    State(facilitator): State<Arc<FacilitatorLocal>>,
    Path((wallet, chain_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, FacilitatorLocalError> {
    let wallet: WalletAddress = parse_param("wallet", &wallet)?;
    let chain_id: ChainId = parse_param("chainId", &chain_id)?;
    let response = facilitator.balance(wallet, chain_id).await?;
    Ok(Json(response))
}

/// `POST /deposit`: credits a confirmed on-chain deposit once per transaction hash.
#[instrument(skip_all)]
pub async fn post_deposit(
    State(facilitator): State<Arc<FacilitatorLocal>>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FacilitatorLocalError> {
    let body = json_body(payload)?;
    let response = facilitator.deposit(&body).await.inspect_err(|error| {
        tracing::warn!(
            error = %error,
            body = %serde_json::to_string(&body).unwrap_or_else(|_| "<can-not-serialize>".to_string()),
            "Deposit failed"
        );
    })?;
    Ok(Json(response))
}

/// `POST /pay`: debits the wallet and settles the payment to the provider.
#[instrument(skip_all)]
pub async fn post_pay(
    State(facilitator): State<Arc<FacilitatorLocal>>,
    payload: Result<Json<PayRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FacilitatorLocalError> {
    let body = json_body(payload)?;
    let response = facilitator.pay(&body).await.inspect_err(|error| {
        tracing::warn!(
            error = %error,
            body = %serde_json::to_string(&body).unwrap_or_else(|_| "<can-not-serialize>".to_string()),
            "Payment failed"
        );
    })?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsParams {
    limit: Option<String>,
    #[serde(rename = "chainId")]
    chain_id: Option<String>,
}

/// `GET /transactions/{wallet}?limit&chainId`: journal entries, newest first.
#[instrument(skip_all)]
pub async fn get_transactions(
    State(facilitator): State<Arc<FacilitatorLocal>>,
    Path(wallet): Path<String>,
    params: Result<Query<TransactionsParams>, QueryRejection>,
) -> Result<impl IntoResponse, FacilitatorLocalError> {
    let wallet: WalletAddress = parse_param("wallet", &wallet)?;
    let Query(params) =
        params.map_err(|rejection| FacilitatorLocalError::Validation(rejection.body_text()))?;
    let limit = params
        .limit
        .filter(|s| !s.is_empty())
        .map(|s| parse_param::<usize>("limit", &s))
        .transpose()?;
    let chain_id = params
        .chain_id
        .filter(|s| !s.is_empty())
        .map(|s| parse_param::<ChainId>("chainId", &s))
        .transpose()?;
    let response = facilitator.transactions(wallet, chain_id, limit).await?;
    Ok(Json(response))
}

/// `GET /supported-chains`: the chain registry.
#[instrument(skip_all)]
pub async fn get_supported_chains(
    State(facilitator): State<Arc<FacilitatorLocal>>,
) -> Result<impl IntoResponse, FacilitatorLocalError> {
    let response = facilitator.supported_chains().await?;
    Ok(Json(response))
}

impl IntoResponse for FacilitatorLocalError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::ValidationError
            | ErrorKind::InsufficientBalance
            | ErrorKind::DuplicateDeposit
            | ErrorKind::ChainUnsupported => StatusCode::BAD_REQUEST,
            ErrorKind::SettlementFailure | ErrorKind::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let mut body = ErrorResponse::new(kind, self.to_string());
        if let FacilitatorLocalError::InsufficientBalance {
            required,
            available,
        } = self
        {
            body.required = Some(required);
            body.available = Some(available);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use nexus_types::chain::{ChainRegistry, ChainsConfig};
    use nexus_types::settlement::SettlementRegistry;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const WALLET: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123";
    const PROVIDER: &str = "0x00000000000000000000000000000000000000ee";

    fn app() -> Router {
        let chains = ChainRegistry::build(&ChainsConfig::default(), |_| None).unwrap();
        let facilitator = FacilitatorLocal::new(
            Arc::new(chains),
            Arc::new(MemoryLedger::new()),
            SettlementRegistry::new(),
        );
        routes().with_state(Arc::new(facilitator))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn deposit_body(tx_hash: &str, amount: &str) -> Value {
        json!({
            "wallet": WALLET,
            "chainId": 240,
            "amount": amount,
            "txHash": tx_hash,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn test_deposit_pay_and_history() {
        let app = app();
        let tx_hash = format!("0x{}", "ab".repeat(32));
        let (status, body) = call(
            &app,
            Method::POST,
            "/deposit",
            Some(deposit_body(&tx_hash, "1000000000000000000")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["txHash"], tx_hash);
        assert_eq!(body["newBalance"], "1000000000000000000");
        assert_eq!(body["amountFormatted"], "1.0");

        let (status, body) = call(
            &app,
            Method::POST,
            "/pay",
            Some(json!({
                "wallet": WALLET,
                "provider": PROVIDER,
                "amount": "250000000000000000",
                "chainId": 240
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amountPaid"], "250000000000000000");
        assert_eq!(body["newBalance"], "750000000000000000");
        assert_eq!(body["newBalanceFormatted"], "0.75");
        assert_eq!(body["settlement"], "simulated");

        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/balance/{WALLET}/240"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["virtualBalance"], "750000000000000000");
        assert_eq!(body["virtualBalanceFormatted"], "0.75");
        assert_eq!(body["chainName"], "Cronos zkEVM Testnet");

        let (status, body) = call(&app, Method::GET, &format!("/balance/{WALLET}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balances"]["240"]["virtual"], "750000000000000000");
        assert_eq!(body["balances"]["240"]["symbol"], "zkCRO");

        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/transactions/{WALLET}?limit=10&chainId=240"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["transactions"][0]["type"], "payment");
        assert_eq!(body["transactions"][0]["status"], "completed");
        assert_eq!(body["transactions"][0]["amountFormatted"], "0.25");
        assert_eq!(body["transactions"][1]["type"], "deposit");
    }

    #[tokio::test]
    async fn test_duplicate_deposit_is_rejected_case_insensitively() {
        let app = app();
        let lower = format!("0x{}", "ab".repeat(32));
        let upper = format!("0x{}", "AB".repeat(32));
        let (status, _) = call(&app, Method::POST, "/deposit", Some(deposit_body(&lower, "5"))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) =
            call(&app, Method::POST, "/deposit", Some(deposit_body(&upper, "5"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "DuplicateDeposit");

        let (_, body) = call(&app, Method::GET, &format!("/balance/{WALLET}/240"), None).await;
        assert_eq!(body["virtualBalance"], "5");
    }

    #[tokio::test]
    async fn test_insufficient_balance_body() {
        let (status, body) = call(
            &app(),
            Method::POST,
            "/pay",
            Some(json!({
                "wallet": WALLET,
                "provider": PROVIDER,
                "amount": "10",
                "chainId": 240
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InsufficientBalance");
        assert_eq!(body["required"], "10");
        assert_eq!(body["available"], "0");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = app();
        let tx_hash = format!("0x{}", "cd".repeat(32));
        for amount in ["-1", "0.5", "", "1e18"] {
            let (status, body) = call(
                &app,
                Method::POST,
                "/deposit",
                Some(deposit_body(&tx_hash, amount)),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount:?}");
            assert_eq!(body["error"], "ValidationError");
        }

        let (status, body) = call(
            &app,
            Method::POST,
            "/deposit",
            Some(json!({"wallet": WALLET, "chainId": 240, "amount": "1", "txHash": "0x1234"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");

        let (status, body) = call(&app, Method::POST, "/pay", Some(json!({"wallet": WALLET}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");

        let (status, body) = call(&app, Method::GET, "/balance/not-a-wallet", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");

        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/transactions/{WALLET}?limit=ten"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
    }

    #[tokio::test]
    async fn test_unsupported_chain() {
        let app = app();
        let (status, body) = call(&app, Method::GET, &format!("/balance/{WALLET}/1"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ChainUnsupported");

        let (status, body) = call(
            &app,
            Method::POST,
            "/pay",
            Some(json!({
                "wallet": WALLET,
                "provider": PROVIDER,
                "amount": "1",
                "chainId": 1
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ChainUnsupported");
    }

    #[tokio::test]
    async fn test_supported_chains() {
        let (status, body) = call(&app(), Method::GET, "/supported-chains", None).await;
        assert_eq!(status, StatusCode::OK);
        let chains = body["chains"].as_array().unwrap();
        assert_eq!(chains.len(), 4);
        assert_eq!(chains[0]["chainId"], 240);
        assert_eq!(chains[0]["symbol"], "zkCRO");
    }
}

//! [`reqwest_middleware`] integration.
//!
//! [`X402Payments`] answers `402 Payment Required` responses the same way
//! [`X402Client`] does, but hands a successful retried response back untouched
//! instead of wrapping it in an [`UnlockedResource`](crate::UnlockedResource).
//!
//! Once a payment has settled, a failed or non-2xx retry is returned as
//! [`rqm::Error::Middleware`] wrapping an [`X402Error`] that carries the
//! receipt ([`X402Error::AccessDenied`] or [`X402Error::RetryFailed`]).

use http::{Extensions, StatusCode};
use nexus_types::facilitator::Facilitator;
use reqwest::{Client, Request, Response};
use reqwest_middleware as rqm;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::{X402Client, X402Error, attach_proof};

/// Middleware that pays `402` challenges through a facilitator and retries
/// the request once with the proof header.
#[derive(Clone, Debug)]
pub struct X402Payments<F> {
    payer: X402Client<F>,
}

impl<F> X402Payments<F> {
    pub fn new(payer: X402Client<F>) -> Self {
        Self { payer }
    }
}

fn middleware_error<E>(error: X402Error<E>) -> rqm::Error
where
    X402Error<E>: std::error::Error + Send + Sync + 'static,
{
    rqm::Error::Middleware(error.into())
}

#[async_trait::async_trait]
impl<F> rqm::Middleware for X402Payments<F>
where
    F: Facilitator + Send + Sync + 'static,
{
    #[cfg_attr(feature = "telemetry", instrument(name = "x402.reqwest.handle", skip_all, err))]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res);
        }
        tracing::debug!(url = %res.url(), "Received 402 Payment Required");

        let mut retry = retry_req
            .ok_or(X402Error::<F::Error>::RequestNotCloneable)
            .map_err(middleware_error)?;
        let challenge = self
            .payer
            .read_challenge(res)
            .await
            .map_err(middleware_error)?;
        let receipt = self
            .payer
            .pay_challenge(&challenge)
            .await
            .map_err(middleware_error)?;
        attach_proof(&mut retry, &receipt)
            .map_err(|source| middleware_error(X402Error::<F::Error>::ProofHeader { receipt, source }))?;

        let res = match next.run(retry, extensions).await {
            Ok(res) => res,
            Err(rqm::Error::Reqwest(source)) => {
                return Err(middleware_error(X402Error::<F::Error>::RetryFailed {
                    receipt,
                    source,
                }));
            }
            Err(e) => {
                tracing::error!(tx_hash = %receipt.tx_hash, error = %e, "Paid request failed in a later middleware");
                return Err(e);
            }
        };
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        tracing::warn!(tx_hash = %receipt.tx_hash, %status, "Paid request was not unlocked");
        Err(middleware_error(X402Error::<F::Error>::AccessDenied {
            receipt,
            status,
            body,
        }))
    }
}

/// Adds x402 payments to a [`reqwest::Client`].
pub trait ReqwestWithPayments {
    fn with_payments<F>(self, payer: X402Client<F>) -> rqm::ClientBuilder
    where
        F: Facilitator + Send + Sync + 'static;
}

impl ReqwestWithPayments for Client {
    fn with_payments<F>(self, payer: X402Client<F>) -> rqm::ClientBuilder
    where
        F: Facilitator + Send + Sync + 'static,
    {
        rqm::ClientBuilder::new(self).with(X402Payments::new(payer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::TxHash;
    use crate::client::PaymentStage;
    use nexus_types::proto::{PayRequest, PayResponse, SettlementMode, SupportedChainsResponse};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, thiserror::Error)]
    #[error("Payment declined")]
    struct Declined;

    #[derive(Default)]
    struct AlwaysPays {
        calls: Arc<AtomicUsize>,
    }

    impl Facilitator for AlwaysPays {
        type Error = Declined;

        async fn pay(&self, request: &PayRequest) -> Result<PayResponse, Declined> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PayResponse {
                success: true,
                tx_hash: TxHash::repeat_byte(0x22),
                amount_paid: request.amount,
                amount_formatted: request.amount.format_ether(),
                new_balance: request.amount,
                new_balance_formatted: request.amount.format_ether(),
                settlement: SettlementMode::Simulated,
            })
        }

        async fn supported_chains(&self) -> Result<SupportedChainsResponse, Declined> {
            Err(Declined)
        }
    }

    #[tokio::test]
    async fn test_middleware_pays_and_retries() {
        let server = MockServer::start().await;
        let proof = format!("{}:84532", TxHash::repeat_byte(0x22));
        Mock::given(method("GET"))
            .and(path("/report"))
            .and(header("x-payment", proof.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"report": 1})))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "payment": {
                    "recipient": "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123",
                    "amount": "5",
                    "supportedChains": [{"chainId": 84532}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let payer = X402Client::new(
            AlwaysPays::default(),
            "0xabcdef0000000000000000000000000000000001".parse().unwrap(),
        );
        let http = Client::new().with_payments(payer).build();
        let response = http
            .get(format!("{}/report", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({"report": 1}));
    }

    #[tokio::test]
    async fn test_middleware_reports_paid_but_locked() {
        let server = MockServer::start().await;
        let proof = format!("{}:240", TxHash::repeat_byte(0x22));
        Mock::given(method("GET"))
            .and(path("/report"))
            .and(header("x-payment", proof.as_str()))
            .respond_with(ResponseTemplate::new(403).set_body_string("proof rejected"))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "address": "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123",
                "cost": "5",
                "chainId": 240
            })))
            .expect(1)
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let payer = X402Client::new(
            AlwaysPays {
                calls: calls.clone(),
            },
            "0xabcdef0000000000000000000000000000000001".parse().unwrap(),
        );
        let http = Client::new().with_payments(payer).build();
        let err = http
            .get(format!("{}/report", server.uri()))
            .send()
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let rqm::Error::Middleware(err) = err else {
            panic!("expected a middleware error, got {err:?}");
        };
        let err = err.downcast_ref::<X402Error<Declined>>().unwrap();
        assert_eq!(err.stage(), PaymentStage::PaidButLocked);
        assert_eq!(err.receipt().unwrap().tx_hash, TxHash::repeat_byte(0x22));
        assert!(matches!(
            err,
            X402Error::AccessDenied { status, body, .. }
                if *status == StatusCode::FORBIDDEN && body == "proof rejected"
        ));
    }

    #[tokio::test]
    async fn test_middleware_passes_through_unpaid_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let payer = X402Client::new(
            AlwaysPays {
                calls: calls.clone(),
            },
            "0xabcdef0000000000000000000000000000000001".parse().unwrap(),
        );
        let http = Client::new().with_payments(payer).build();
        let response = http
            .get(format!("{}/missing", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

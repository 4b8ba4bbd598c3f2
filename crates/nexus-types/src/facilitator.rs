//! The payment backend seam used by x402 clients.
//!
//! Both the in-process ledger and the remote HTTP client implement
//! [`Facilitator`], so a paying client can be wired to either.

use std::sync::Arc;

use crate::proto::{PayRequest, PayResponse, SupportedChainsResponse};

/// A backend that debits a virtual balance and settles the payment.
pub trait Facilitator {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Pays `request.amount` from `request.wallet` to `request.provider`.
    fn pay(
        &self,
        request: &PayRequest,
    ) -> impl Future<Output = Result<PayResponse, Self::Error>> + Send;

    /// Lists the chains the backend can settle on.
    fn supported_chains(
        &self,
    ) -> impl Future<Output = Result<SupportedChainsResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn pay(
        &self,
        request: &PayRequest,
    ) -> impl Future<Output = Result<PayResponse, Self::Error>> + Send {
        (**self).pay(request)
    }

    fn supported_chains(
        &self,
    ) -> impl Future<Output = Result<SupportedChainsResponse, Self::Error>> + Send {
        (**self).supported_chains()
    }
}

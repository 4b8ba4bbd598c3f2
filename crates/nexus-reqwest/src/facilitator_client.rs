//! A [`Facilitator`] that talks to a _remote_ Nexus facilitator over HTTP.
//!
//! [`FacilitatorClient`] posts to `/pay` and reads `/supported-chains`
//! relative to a base URL, so it works against the facilitator binary
//! directly or behind a path prefix.
//!
//! ```rust
//! use nexus_reqwest::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::try_from("http://localhost:3001").unwrap();
//! assert_eq!(facilitator.pay_url().as_str(), "http://localhost:3001/pay");
//! ```
//!
//! Error bodies of the form `{"success": false, "error": "<Kind>", "message": "..."}`
//! come back as [`FacilitatorClientError::Rejected`] with the parsed
//! [`ErrorResponse`].

use http::{HeaderMap, StatusCode};
use nexus_types::facilitator::Facilitator;
use nexus_types::proto::{ErrorResponse, PayRequest, PayResponse, SupportedChainsResponse};
use reqwest::Client;
use std::fmt::Display;
use std::time::Duration;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span, instrument};

/// Client for a remote Nexus facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    pay_url: Url,
    supported_chains_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    #[cfg(feature = "telemetry")]
    async fn pay(&self, request: &PayRequest) -> Result<PayResponse, FacilitatorClientError> {
        FacilitatorClient::pay(self, request)
            .instrument(tracing::info_span!("x402.facilitator_client.pay", timeout = ?self.timeout))
            .await
    }

    #[cfg(not(feature = "telemetry"))]
    async fn pay(&self, request: &PayRequest) -> Result<PayResponse, FacilitatorClientError> {
        FacilitatorClient::pay(self, request).await
    }

    async fn supported_chains(&self) -> Result<SupportedChainsResponse, FacilitatorClientError> {
        FacilitatorClient::supported_chains(self).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Facilitator rejected {context} with {status}: {}: {}", .response.error, .response.message)]
    Rejected {
        context: &'static str,
        status: StatusCode,
        response: ErrorResponse,
    },
}

impl FacilitatorClientError {
    /// The facilitator's error body, when it sent one.
    pub fn rejection(&self) -> Option<&ErrorResponse> {
        match self {
            FacilitatorClientError::Rejected { response, .. } => Some(response),
            _ => None,
        }
    }
}

impl FacilitatorClient {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn pay_url(&self) -> &Url {
        &self.pay_url
    }

    pub fn supported_chains_url(&self) -> &Url {
        &self.supported_chains_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> &Option<Duration> {
        &self.timeout
    }

    /// Builds a client whose endpoints are resolved against `base_url`.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let pay_url = base_url
            .join("./pay")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "Failed to construct ./pay URL",
                source: e,
            })?;
        let supported_chains_url =
            base_url
                .join("./supported-chains")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./supported-chains URL",
                    source: e,
                })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            pay_url,
            supported_chains_url,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Sends a `POST /pay` request to the facilitator.
    pub async fn pay(&self, request: &PayRequest) -> Result<PayResponse, FacilitatorClientError> {
        let mut req = self.client.post(self.pay_url.clone()).json(request);
        req = self.decorate(req);
        self.send_json(req, "POST /pay").await
    }

    /// Sends a `GET /supported-chains` request.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.facilitator_client.supported_chains", skip_all, err)
    )]
    pub async fn supported_chains(&self) -> Result<SupportedChainsResponse, FacilitatorClientError> {
        let req = self.decorate(self.client.get(self.supported_chains_url.clone()));
        self.send_json(req, "GET /supported-chains").await
    }

    fn decorate(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        req
    }

    /// Sends `req` and decodes a `200` body as `R`.
    ///
    /// Non-`200` responses carrying an [`ErrorResponse`] body become
    /// [`FacilitatorClientError::Rejected`]; anything else becomes
    /// [`FacilitatorClientError::HttpStatus`].
    async fn send_json<R>(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(response) => Err(FacilitatorClientError::Rejected {
                    context,
                    status,
                    response,
                }),
                Err(_) => Err(FacilitatorClientError::HttpStatus {
                    context,
                    status,
                    body,
                }),
            }
        };

        record_result_on_span(&result);

        result
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Endpoints are joined relative to the base, which needs a trailing slash.
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}

#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

//! `GET /services`: providers by category, ranked by reputation.
//!
//! Query parameters are all optional: `category` (default `news`),
//! `maxPrice` in wei (default 1 ether) and `chainId` (default 240).

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nexus_registry::{ServiceQuery, ServiceRegistry};
use nexus_types::proto::{ErrorKind, ErrorResponse};
use std::sync::Arc;
use tracing::instrument;

pub fn routes() -> Router<Arc<ServiceRegistry>> {
    Router::new().route("/services", get(get_services))
}

#[instrument(skip_all)]
pub async fn get_services(
    State(registry): State<Arc<ServiceRegistry>>,
    query: Result<Query<ServiceQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            let body = ErrorResponse::new(ErrorKind::ValidationError, rejection.body_text());
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };
    let discovery = registry.find_services(&query).await;
    tracing::info!(
        category = %query.category,
        chain = %query.chain_id,
        count = discovery.count,
        source = ?discovery.source,
        "Service discovery"
    );
    Json(discovery).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(uri: &str) -> (StatusCode, Value) {
        let app = routes().with_state(Arc::new(ServiceRegistry::new()));
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_services_defaults() {
        let (status, body) = call("/services").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["count"], 1);
        assert_eq!(body["services"][0]["category"], "news");
        assert_eq!(body["services"][0]["priceWei"], "100000000000000000");
        assert_eq!(body["services"][0]["priceFormatted"], "0.1");
    }

    #[tokio::test]
    async fn test_services_max_price_filter() {
        let (status, body) = call("/services?category=predictions&maxPrice=500000000000000000").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
        let (_, body) = call("/services?category=charts&maxPrice=300000000000000000&chainId=240").await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["services"][0]["reputationScore"], 156);
    }

    #[tokio::test]
    async fn test_services_invalid_query() {
        let (status, body) = call("/services?maxPrice=0.5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["success"], false);
    }
}

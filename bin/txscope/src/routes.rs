//! HTTP routes over the read-side query service.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;
use txscope_query::{QueryError, QueryService};
use txscope_storage::Store;

const DEFAULT_TX_COUNT: usize = 10;

/// Builds the API router.
pub(crate) fn router<S: Store + 'static>(query: Arc<QueryService<S>>) -> Router {
    Router::new()
        .route("/transactions", get(latest_transactions::<S>))
        .route("/transaction/:hash", get(transaction_details::<S>))
        .route("/inclusion-lists", get(inclusion_lists::<S>))
        .route("/feature/focil", get(focil_flag::<S>))
        .route("/ping", get(ping))
        .layer(CorsLayer::permissive())
        .with_state(query)
}

#[derive(Debug, Deserialize)]
struct LatestParams {
    tx_count: Option<usize>,
}

async fn latest_transactions<S: Store>(
    State(query): State<Arc<QueryService<S>>>,
    Query(params): Query<LatestParams>,
) -> Response {
    let count = params.tx_count.unwrap_or(DEFAULT_TX_COUNT);
    match query.latest_summaries(count).await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn transaction_details<S: Store>(
    State(query): State<Arc<QueryService<S>>>,
    Path(hash): Path<String>,
) -> Response {
    match query.transaction_details(&hash).await {
        Ok(Some(comparison)) => Json(comparison).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(err),
    }
}

async fn inclusion_lists<S: Store>(State(query): State<Arc<QueryService<S>>>) -> Response {
    match query.inclusion_reports().await {
        Ok(reports) => Json(reports).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn focil_flag<S: Store>(State(query): State<Arc<QueryService<S>>>) -> Response {
    Json(query.focil_enabled()).into_response()
}

async fn ping() -> &'static str {
    "pong"
}

fn internal_error(err: QueryError) -> Response {
    error!(target: "txscope::api", %err, "Query failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use tower::ServiceExt;
    use txscope_storage::MemoryStore;

    fn test_router(focil: bool) -> Router {
        let store = Arc::new(MemoryStore::new());
        let query = Arc::new(QueryService::new(store, vec!["alpha".into()], focil));
        router(query)
    }

    #[tokio::test]
    async fn ping_pongs() {
        let response = test_router(false)
            .oneshot(Request::get("/ping").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 16).await.unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn focil_flag_reflects_config() {
        let response = test_router(true)
            .oneshot(Request::get("/feature/focil").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), 16).await.unwrap();
        assert_eq!(&body[..], b"true");
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let response = test_router(false)
            .oneshot(Request::get("/transaction/0xabc").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_store_lists_no_transactions() {
        let response = test_router(false)
            .oneshot(
                Request::get("/transactions?tx_count=5").body(axum::body::Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"[]");
    }
}

//! Upload-service axum router (`spec.md` §6, `/v1` prefix).

use axum::Router;
use axum::routing::{get, post, put};

use super::handlers;
use super::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tx", post(handlers::ingest_signed))
        .route("/v1/tx/multipart", post(handlers::create_multipart))
        .route(
            "/v1/tx/multipart/{uploadId}/finalize/{token}",
            post(handlers::finalize_multipart),
        )
        .route("/v1/tx/multipart/{uploadId}/{partNumber}", put(handlers::upload_part))
        .route("/v1/tx/{token}", post(handlers::ingest_raw))
        .route("/v1/price/x402/data-item/{token}/{byteCount}", get(handlers::price_data_item))
        .route("/v1/price/x402/data/{token}/{byteCount}", get(handlers::price_data))
        .route("/v1/tx/{id}/status", get(handlers::status))
        .route("/v1/tx/{id}/offset", get(handlers::offset))
}

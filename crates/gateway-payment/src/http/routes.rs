//! Payment-service axum router (`spec.md` §6, `/v1` prefix).

use axum::Router;
use axum::routing::{get, post};

use super::handlers;
use super::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/x402/price/{sigType}/{address}", get(handlers::price))
        .route("/v1/x402/payment/{sigType}/{address}", post(handlers::pay))
        .route("/v1/x402/top-up/{sigType}/{address}", post(handlers::top_up))
        .route("/v1/x402/finalize", post(handlers::finalize))
        .route("/v1/balance", get(handlers::balance))
        .route("/v1/reserve-balance", post(handlers::reserve_balance))
        .route("/v1/check-balance", post(handlers::check_balance))
        .route("/v1/finalize-reservation", post(handlers::finalize_reservation))
}

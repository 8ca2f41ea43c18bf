//! Payment-service HTTP entrypoint: credit ledger, balance reservations, and
//! the x402 payment engine (`spec.md` §4.2, §4.4, §6).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Method;
use gateway_payment::config::Config;
use gateway_payment::db::Database;
use gateway_payment::http::{AppState, routes};
use gateway_payment::sig_down::SigDown;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "payment-service exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let database = Database::connect(&config.database_url).await?;
    database.migrate().await?;

    let oracle: Arc<dyn gateway_pricing::PriceOracle> = Arc::new(gateway_pricing::CachedArUsdOracle::new(
        reqwest::Client::new(),
        "https://api.coingecko.com/api/v3/simple/price?ids=arweave&vs_currencies=usd",
    ));
    let state = AppState::new(database.pool().clone(), config, oracle)?;

    spawn_reservation_sweeper(state.clone());

    let app = Router::new()
        .merge(routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        )
        .with_state(state.clone());

    let addr = SocketAddr::new(state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "payment-service listening");

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;

    Ok(())
}

/// `spec.md` §4.2: "a background sweeper deletes x402 reservations older
/// than one hour."
fn spawn_reservation_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            match state.engine.sweep_expired_reservations().await {
                Ok(deleted) if deleted > 0 => tracing::info!(deleted, "swept expired x402 reservations"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "x402 reservation sweep failed"),
            }
        }
    });
}

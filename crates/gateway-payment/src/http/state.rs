//! Shared axum state for the payment service.

use std::sync::Arc;

use gateway_pricing::PriceOracle;
use sqlx::PgPool;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::x402::Engine;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ledger: Ledger,
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
    pub oracle: Arc<dyn PriceOracle>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, oracle: Arc<dyn PriceOracle>) -> Result<Self, crate::x402::EngineError> {
        let config = Arc::new(config);
        let engine = Arc::new(Engine::new(pool.clone(), &config, oracle.clone())?);
        Ok(Self {
            ledger: Ledger::new(pool.clone()),
            pool,
            engine,
            config,
            oracle,
        })
    }
}

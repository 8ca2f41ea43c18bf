//! Payment-service configuration (`spec.md` §6 configuration table).
//!
//! Follows the teacher's `clap::Parser` + `serde::Deserialize` pattern
//! (`x402-facilitator::config::Config`): flags fall back to environment
//! variables, which fall back to hardcoded defaults. `.env` is loaded via
//! `dotenvy` before parsing, exactly as the teacher's `run()` does.

use std::collections::HashSet;
use std::net::IpAddr;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Clone)]
#[command(name = "payment-service")]
#[command(about = "x402 payment and credit ledger service")]
pub struct Config {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8082)]
    pub port: u16,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Shared bearer secret for internal endpoints (`reserve-balance`,
    /// `finalize-reservation`) consumed by the upload service.
    #[arg(long, env = "INTERNAL_BEARER_SECRET")]
    pub internal_bearer_secret: String,

    #[arg(long, env = "FREE_UPLOAD_LIMIT", default_value_t = 517_120)]
    pub free_upload_limit_bytes: u64,

    #[arg(long, env = "ALLOW_LISTED_ADDRESSES", value_delimiter = ',', default_value = "")]
    pub allow_listed_addresses: Vec<String>,

    #[arg(long, env = "BLOCKLISTED_ADDRESSES", value_delimiter = ',', default_value = "")]
    pub blocklisted_addresses: Vec<String>,

    #[arg(long, env = "X402_PRICING_BUFFER_PERCENT", default_value_t = 15)]
    pub x402_pricing_buffer_percent: u8,

    #[arg(long, env = "X402_FRAUD_TOLERANCE_PERCENT", default_value_t = 5)]
    pub x402_fraud_tolerance_percent: u8,

    #[arg(long, env = "X402_PAYMENT_TIMEOUT_MS", default_value_t = 300_000)]
    pub x402_payment_timeout_ms: u64,

    /// JSON array of per-network configs; see [`NetworkConfig`].
    #[arg(long, env = "X402_NETWORKS", default_value = "[]")]
    pub x402_networks_json: String,

    /// CDP-style facilitator API key id (`kid`/`sub` of the settlement JWT).
    #[arg(long, env = "CDP_API_KEY_ID")]
    pub cdp_api_key_id: Option<String>,

    /// Raw base64 or PEM-wrapped ES256 private key.
    #[arg(long, env = "CDP_API_KEY_SECRET")]
    pub cdp_api_key_secret: Option<String>,
}

/// One enabled network's x402 settlement parameters (`spec.md` §6: `<NET>_ENABLED`,
/// `<NET>_RPC_URL`, `<NET>_USDC_ADDRESS`, `<NET>_CHAIN_ID`, `<NET>_MIN_CONFIRMATIONS`,
/// `<NET>_FACILITATOR_URL`).
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub usdc_address: String,
    pub usdc_name: String,
    pub usdc_version: String,
    pub min_confirmations: u64,
    pub facilitator_url: String,
    pub pay_to: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(Config::parse())
    }

    pub fn networks(&self) -> Result<Vec<NetworkConfig>, ConfigError> {
        Ok(serde_json::from_str(&self.x402_networks_json)?)
    }

    pub fn allow_listed(&self) -> HashSet<String> {
        self.allow_listed_addresses.iter().filter(|s| !s.is_empty()).cloned().collect()
    }

    pub fn blocklisted(&self) -> HashSet<String> {
        self.blocklisted_addresses.iter().filter(|s| !s.is_empty()).cloned().collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse X402_NETWORKS: {0}")]
    NetworksJson(#[from] serde_json::Error),
}

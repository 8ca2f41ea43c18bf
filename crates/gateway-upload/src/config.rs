//! Upload-service configuration (`spec.md` §6 configuration table).
//!
//! Mirrors `gateway-payment::config`'s `clap::Parser` + `dotenvy` pattern.

use std::collections::HashSet;
use std::net::IpAddr;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "upload-service")]
#[command(about = "ANS-104 ingest and bundle lifecycle service")]
pub struct Config {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8081)]
    pub port: u16,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "REDIS_URL")]
    pub redis_url: String,

    /// Base URL of the payment-service, consulted for balance reservations
    /// and x402 finalization (`spec.md` §5, §6).
    #[arg(long, env = "PAYMENT_SERVICE_URL")]
    pub payment_service_url: String,

    #[arg(long, env = "INTERNAL_BEARER_SECRET")]
    pub internal_bearer_secret: String,

    /// S3/MinIO endpoint override; `None` targets AWS S3 directly.
    #[arg(long, env = "S3_ENDPOINT_URL")]
    pub s3_endpoint_url: Option<String>,

    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: String,

    /// Root of the best-effort backup filesystem mirror (`spec.md` §4.5).
    #[arg(long, env = "BACKUP_FS_ROOT")]
    pub backup_fs_root: Option<String>,

    #[arg(long, env = "MAX_SINGLE_DATA_ITEM_BYTE_COUNT", default_value_t = 4 * 1024 * 1024 * 1024)]
    pub max_single_data_item_byte_count: u64,

    #[arg(long, env = "FREE_UPLOAD_LIMIT", default_value_t = 517_120)]
    pub free_upload_limit_bytes: u64,

    #[arg(long, env = "ALLOW_LISTED_ADDRESSES", value_delimiter = ',', default_value = "")]
    pub allow_listed_addresses: Vec<String>,

    #[arg(long, env = "BLOCKLISTED_ADDRESSES", value_delimiter = ',', default_value = "")]
    pub blocklisted_addresses: Vec<String>,

    #[arg(long, env = "X402_PRICING_BUFFER_PERCENT", default_value_t = 15)]
    pub x402_pricing_buffer_percent: u8,

    /// `0x`-optional 32-byte hex private key used to sign upload receipts
    /// (`spec.md` §4.1). A real deployment loads this from a secrets
    /// manager; the service treats it as an opaque config value.
    #[arg(long, env = "RECEIPT_SIGNING_KEY")]
    pub receipt_signing_key: String,

    #[arg(long, env = "HOT_CACHE_MAX_ITEM_BYTES", default_value_t = 256 * 1024)]
    pub hot_cache_max_item_bytes: usize,

    #[arg(long, env = "HOT_CACHE_TTL_SECS", default_value_t = 600)]
    pub hot_cache_ttl_secs: u64,

    /// How long `permanent` items' backup-fs mirror is retained before
    /// `cleanup-fs` deletes it (`spec.md` §4.5).
    #[arg(long, env = "BACKUP_FS_RETENTION_SECS", default_value_t = 7 * 24 * 3600)]
    pub backup_fs_retention_secs: u64,

    #[arg(long, env = "MULTIPART_DEFAULT_CHUNK_SIZE", default_value_t = gateway_types::multipart::DEFAULT_CHUNK_SIZE)]
    pub multipart_default_chunk_size: u64,

    #[arg(long, env = "RETRY_LIMIT_FOR_FAILED_DATA_ITEMS", default_value_t = gateway_types::bundle::RETRY_LIMIT_FOR_FAILED_DATA_ITEMS as i32)]
    pub retry_limit_for_failed_data_items: i32,

    /// Identifier of the wallet `post-bundle` posts bundle transactions
    /// under, passed straight through to `ArweaveGateway::post_transaction`.
    #[arg(long, env = "OWNER_WALLET_ID")]
    pub owner_wallet_id: String,
}

impl Config {
    pub fn load() -> Result<Self, clap::Error> {
        dotenvy::dotenv().ok();
        Config::try_parse()
    }

    pub fn allow_listed(&self) -> HashSet<String> {
        self.allow_listed_addresses.iter().filter(|s| !s.is_empty()).cloned().collect()
    }

    pub fn blocklisted(&self) -> HashSet<String> {
        self.blocklisted_addresses.iter().filter(|s| !s.is_empty()).cloned().collect()
    }
}

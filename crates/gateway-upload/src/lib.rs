//! The upload-service: streaming ANS-104 ingest, the x402/credit payment
//! decision, the bundle lifecycle engine (plan -> prepare -> post -> seed ->
//! verify), and the redundant storage fabric that backs it (`spec.md` §4).

pub mod bundle;
pub mod config;
pub mod db;
pub mod dedicated_bundles;
pub mod error;
pub mod gateway_client;
pub mod http;
pub mod indexer;
pub mod ingress;
pub mod multipart;
pub mod payment_client;
pub mod receipt_signer;
pub mod sig_down;
pub mod token;

pub use config::Config;
pub use error::UploadError;

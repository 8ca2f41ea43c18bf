//! Credit ledger, balance reservations, the x402 payment engine, and the
//! payment-service HTTP surface (`spec.md` §4.2, §4.4).

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod ledger;
pub mod sig_down;
pub mod x402;

pub use config::Config;
pub use error::PaymentError;

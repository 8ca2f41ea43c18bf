//! Shared wire and domain types for the permaweb storage-bundler gateway.
//!
//! This crate has no I/O: it is the vocabulary both services (`gateway-payment`,
//! `gateway-upload`) and the storage/queue/pricing crates share.

pub mod ans104;
pub mod bundle;
pub mod chain_id;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod money;
pub mod multipart;
pub mod offsets;
pub mod receipt;
pub mod tags;
pub mod user;
pub mod x402;

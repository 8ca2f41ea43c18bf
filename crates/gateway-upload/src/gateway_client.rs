//! The blockchain RPC/gateway HTTP client: a non-goal per `spec.md` §1
//! ("the blockchain RPC/gateway HTTP clients ... their contract appears
//! only as an interface"). This module is the seam `post-bundle`,
//! `seed-bundle`, and `verify-bundle` program against; a real
//! implementation posts transactions and chunks to an Arweave-compatible
//! node, while [`InMemoryArweaveGateway`] gives the worker tests a
//! deterministic chain to drive.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use gateway_types::money::Winston;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("fatal chunk upload error: {0}")]
    Fatal(String),
    #[error("transient error: {0}")]
    Transient(String),
}

/// Errors the blockchain gateway can return for a chunk upload that the
/// `post-bundle`/`seed-bundle` workers must never retry (`spec.md` §4.3).
pub const FATAL_CHUNK_UPLOAD_ERRORS: &[&str] = &[
    "invalid_json",
    "chunk_too_big",
    "data_path_too_big",
    "offset_too_big",
    "data_size_too_big",
    "chunk_proof_ratio_not_attractive",
    "invalid_proof",
];

pub fn is_fatal_chunk_error(code: &str) -> bool {
    FATAL_CHUNK_UPLOAD_ERRORS.contains(&code)
}

#[derive(Debug, Clone)]
pub struct PostedTransaction {
    pub bundle_id: String,
    pub reward: Winston,
}

/// Abstracts "post a signed transaction", "upload a chunk", and "read the
/// current chain tip", the three primitives the bundle lifecycle needs from
/// the blockchain gateway.
#[async_trait]
pub trait ArweaveGateway: Send + Sync {
    async fn post_transaction(
        &self,
        owner_wallet_id: &str,
        transaction_byte_count: u64,
        payload_byte_count: u64,
    ) -> Result<PostedTransaction, GatewayError>;

    async fn upload_chunk(&self, bundle_id: &str, chunk_index: u64, chunk: Bytes) -> Result<(), GatewayError>;

    async fn current_block_height(&self) -> Result<u64, GatewayError>;

    /// The block height the bundle was included at, if any.
    async fn transaction_block_height(&self, bundle_id: &str) -> Result<Option<u64>, GatewayError>;
}

#[derive(Default)]
pub struct InMemoryArweaveGateway {
    tip: Mutex<u64>,
    included_at: Mutex<HashMap<String, u64>>,
}

impl InMemoryArweaveGateway {
    pub fn new(starting_tip: u64) -> Self {
        Self {
            tip: Mutex::new(starting_tip),
            included_at: Mutex::new(HashMap::new()),
        }
    }

    pub fn advance_tip(&self, blocks: u64) {
        *self.tip.lock().unwrap() += blocks;
    }

    pub fn include_at_current_tip(&self, bundle_id: &str) {
        let tip = *self.tip.lock().unwrap();
        self.included_at.lock().unwrap().insert(bundle_id.to_string(), tip);
    }
}

#[async_trait]
impl ArweaveGateway for InMemoryArweaveGateway {
    async fn post_transaction(
        &self,
        _owner_wallet_id: &str,
        transaction_byte_count: u64,
        _payload_byte_count: u64,
    ) -> Result<PostedTransaction, GatewayError> {
        let bundle_id = uuid::Uuid::new_v4().to_string();
        self.include_at_current_tip(&bundle_id);
        Ok(PostedTransaction {
            bundle_id,
            reward: Winston::new(transaction_byte_count as u128 * 10),
        })
    }

    async fn upload_chunk(&self, _bundle_id: &str, _chunk_index: u64, _chunk: Bytes) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn current_block_height(&self) -> Result<u64, GatewayError> {
        Ok(*self.tip.lock().unwrap())
    }

    async fn transaction_block_height(&self, bundle_id: &str) -> Result<Option<u64>, GatewayError> {
        Ok(self.included_at.lock().unwrap().get(bundle_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_match_the_configured_list() {
        assert!(is_fatal_chunk_error("invalid_proof"));
        assert!(!is_fatal_chunk_error("timeout"));
    }
}

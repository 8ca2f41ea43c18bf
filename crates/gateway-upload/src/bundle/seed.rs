//! `seed-bundle` (concurrency 2): splits a posted bundle's payload into
//! fixed-size chunks and uploads each to the blockchain gateway. Chunks are
//! content-addressed by the gateway, so a retried run simply re-uploads the
//! same bytes under the same indices.

use async_trait::async_trait;
use gateway_queue::{JobEnvelope, JobHandler};
use gateway_storage::ObjectStore;
use std::sync::Arc;
use tracing::info;

use crate::bundle::payloads::SeedBundlePayload;
use crate::bundle::prepare::bundle_payload_key;
use crate::bundle::repository::LifecycleRepository;
use crate::gateway_client::{ArweaveGateway, GatewayError};

/// Arweave's standard on-chain chunk size.
const BUNDLE_CHUNK_SIZE: usize = 256 * 1024;

pub struct SeedBundleHandler {
    repository: LifecycleRepository,
    object_store: Arc<dyn ObjectStore>,
    gateway: Arc<dyn ArweaveGateway>,
}

impl SeedBundleHandler {
    pub fn new(repository: LifecycleRepository, object_store: Arc<dyn ObjectStore>, gateway: Arc<dyn ArweaveGateway>) -> Self {
        Self { repository, object_store, gateway }
    }
}

#[async_trait]
impl JobHandler<SeedBundlePayload> for SeedBundleHandler {
    type Error = SeedBundleError;

    async fn handle(&self, job: JobEnvelope<SeedBundlePayload>) -> Result<(), Self::Error> {
        let bundle_id = job.payload.bundle_id;
        let bundle = self
            .repository
            .get_bundle(&bundle_id)
            .await?
            .ok_or_else(|| SeedBundleError::BundleNotFound(bundle_id.clone()))?;

        let payload = self.object_store.get_object(&bundle_payload_key(&bundle.plan_id)).await?;

        for (index, chunk) in payload.chunks(BUNDLE_CHUNK_SIZE).enumerate() {
            self.gateway
                .upload_chunk(&bundle_id, index as u64, payload.slice_ref(chunk))
                .await
                .map_err(|e| match e {
                    GatewayError::Fatal(reason) => SeedBundleError::Fatal(reason),
                    GatewayError::Transient(reason) => SeedBundleError::Transient(reason),
                })?;
        }

        info!(%bundle_id, chunks = payload.len().div_ceil(BUNDLE_CHUNK_SIZE), "seeded bundle chunks");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeedBundleError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(#[from] gateway_storage::ObjectStoreError),
    #[error("bundle {0} not found")]
    BundleNotFound(String),
    #[error("fatal chunk upload error: {0}")]
    Fatal(String),
    #[error("transient chunk upload error: {0}")]
    Transient(String),
}

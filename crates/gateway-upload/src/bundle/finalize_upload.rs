//! `finalize-upload` (concurrency >= 3): completes a multipart session's
//! object-store upload, then runs the assembled bytes through the same
//! §4.1 ingest pipeline (charge + persist + receipt) a single-request
//! upload goes through.

use async_trait::async_trait;
use gateway_queue::{JobEnvelope, JobHandler};
use gateway_storage::object_store::{CompletedPart, MultipartUploadHandle};
use std::io;
use tracing::info;

use crate::bundle::payloads::FinalizeUploadPayload;
use crate::error::UploadError;
use crate::ingress::{self, IngestOutcome, IngestState};
use crate::multipart::{self, MultipartRepository};

pub struct FinalizeUploadHandler {
    multipart_repository: MultipartRepository,
    ingest_state: IngestState,
}

impl FinalizeUploadHandler {
    pub fn new(multipart_repository: MultipartRepository, ingest_state: IngestState) -> Self {
        Self { multipart_repository, ingest_state }
    }
}

#[async_trait]
impl JobHandler<FinalizeUploadPayload> for FinalizeUploadHandler {
    type Error = FinalizeUploadError;

    async fn handle(&self, job: JobEnvelope<FinalizeUploadPayload>) -> Result<(), Self::Error> {
        let upload_id = job.payload.upload_id;
        let upload = self.multipart_repository.get(upload_id).await?;
        let parts = self.multipart_repository.parts(upload_id).await?;
        multipart::validate_parts_for_finalize(&parts)?;

        let handle = MultipartUploadHandle {
            upload_id: upload.object_upload_id.clone(),
            key: upload.object_key.clone(),
        };
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| CompletedPart { part_number: p.part_number, etag: p.etag.clone() })
            .collect();
        self.ingest_state.object_store.complete_multipart_upload(handle, completed_parts).await?;

        let assembled = self.ingest_state.object_store.get_object(&upload.object_key).await?;
        let content_length = assembled.len() as u64;
        let IngestOutcome { receipt, .. } =
            ingress::ingest_signed(&self.ingest_state, io::Cursor::new(assembled), Some(content_length), None)
                .await
                .map_err(FinalizeUploadError::Ingest)?;

        self.ingest_state.object_store.delete_object(&upload.object_key).await?;
        self.multipart_repository.delete(upload_id).await?;

        info!(%upload_id, data_item_id = %receipt.id, "finalized multipart upload");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FinalizeUploadError {
    #[error(transparent)]
    Multipart(#[from] crate::multipart::MultipartError),
    #[error("storage error: {0}")]
    Storage(#[from] gateway_storage::ObjectStoreError),
    #[error("ingest error: {0}")]
    Ingest(UploadError),
}

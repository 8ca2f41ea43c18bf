//! `put-offsets` (concurrency 5): batched, idempotent upsert of
//! `data_item_offsets` rows. A per-row failure is logged and skipped by
//! `OffsetsStore::upsert_batch` itself; this handler never poisons the
//! whole batch over one bad row.

use async_trait::async_trait;
use gateway_queue::{JobEnvelope, JobHandler};
use gateway_storage::OffsetsStore;
use gateway_types::offsets::DataItemOffset;
use tracing::info;

use crate::bundle::payloads::{OffsetEntry, PutOffsetsPayload};

pub struct PutOffsetsHandler {
    offsets_store: OffsetsStore,
}

impl PutOffsetsHandler {
    pub fn new(offsets_store: OffsetsStore) -> Self {
        Self { offsets_store }
    }
}

#[async_trait]
impl JobHandler<PutOffsetsPayload> for PutOffsetsHandler {
    type Error = PutOffsetsError;

    async fn handle(&self, job: JobEnvelope<PutOffsetsPayload>) -> Result<(), Self::Error> {
        let rows: Vec<DataItemOffset> = job.payload.offsets.into_iter().map(into_offset).collect();
        let applied = self.offsets_store.upsert_batch(&rows).await?;
        info!(submitted = rows.len(), applied, "put-offsets batch applied");
        Ok(())
    }
}

fn into_offset(entry: OffsetEntry) -> DataItemOffset {
    DataItemOffset {
        data_item_id: entry.data_item_id,
        root_bundle_id: entry.root_bundle_id,
        start_offset_in_root_bundle: entry.start_offset_in_root_bundle,
        raw_content_length: entry.raw_content_length,
        payload_data_start: entry.payload_data_start,
        payload_content_type: entry.payload_content_type,
        parent_data_item_id: entry.parent_data_item_id,
        start_offset_in_parent_payload: entry.start_offset_in_parent_payload,
        expires_at: None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PutOffsetsError {
    #[error(transparent)]
    OffsetsStore(#[from] gateway_storage::offsets_store::OffsetsStoreError),
}

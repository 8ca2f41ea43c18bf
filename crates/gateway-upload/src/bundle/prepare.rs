//! `prepare-bundle` (concurrency 3): streams a plan's data items back out of
//! the object store, concatenates them into the ANS-104 bundle binary
//! (`count(32) || (size(32) || id(32)) * n || item bytes...`), and writes
//! the result to `bundle-payload/<planId>`. Idempotent: a re-run with the
//! same `planId` overwrites the same object with byte-identical content.

use async_trait::async_trait;
use bytes::BytesMut;
use gateway_queue::{JobEnvelope, JobHandler, QueueClient, QueueName, RedisQueue};
use gateway_storage::{ObjectMetadata, ObjectStore};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use std::collections::HashMap;

use crate::bundle::payloads::{PostBundlePayload, PreparedOffset, PrepareBundlePayload};
use crate::bundle::repository::LifecycleRepository;
use crate::ingress;

pub struct PrepareBundleHandler {
    repository: LifecycleRepository,
    object_store: Arc<dyn ObjectStore>,
    queue: RedisQueue,
}

impl PrepareBundleHandler {
    pub fn new(repository: LifecycleRepository, object_store: Arc<dyn ObjectStore>, queue: RedisQueue) -> Self {
        Self { repository, object_store, queue }
    }
}

pub fn bundle_payload_key(plan_id: &Uuid) -> String {
    format!("bundle-payload/{plan_id}")
}

#[async_trait]
impl JobHandler<PrepareBundlePayload> for PrepareBundleHandler {
    type Error = PrepareBundleError;

    async fn handle(&self, job: JobEnvelope<PrepareBundlePayload>) -> Result<(), Self::Error> {
        let plan = self
            .repository
            .get_plan(job.payload.plan_id)
            .await?
            .ok_or(PrepareBundleError::PlanNotFound(job.payload.plan_id))?;

        let planned_items = self.repository.planned_items_for_plan(plan.plan_id).await?;
        let planned_by_id: HashMap<_, _> = planned_items.into_iter().map(|i| (i.data_item_id.clone(), i)).collect();

        let mut item_ids = Vec::with_capacity(plan.data_item_ids.len());
        let mut item_bytes = Vec::with_capacity(plan.data_item_ids.len());
        for data_item_id in &plan.data_item_ids {
            let bytes = self.object_store.get_object(&ingress::object_key(data_item_id)).await?;
            let id = gateway_types::ids::base64url_decode(data_item_id)
                .map_err(|e| PrepareBundleError::InvalidId(data_item_id.clone(), e.to_string()))?;
            item_ids.push(id);
            item_bytes.push(bytes);
        }

        let header_byte_count = 32 + item_ids.len() as u64 * 64;
        let mut header = BytesMut::with_capacity(header_byte_count as usize);
        header.extend_from_slice(&le_u256(item_ids.len() as u128));
        for (id, bytes) in item_ids.iter().zip(item_bytes.iter()) {
            header.extend_from_slice(&le_u256(bytes.len() as u128));
            header.extend_from_slice(id);
        }

        let payload_byte_count: u64 = item_bytes.iter().map(|b| b.len() as u64).sum();
        let mut bundle = BytesMut::with_capacity(header.len() + payload_byte_count as usize);
        bundle.extend_from_slice(&header);
        for bytes in &item_bytes {
            bundle.extend_from_slice(bytes);
        }

        let mut offsets = Vec::with_capacity(plan.data_item_ids.len());
        let mut cursor = header_byte_count;
        for (data_item_id, bytes) in plan.data_item_ids.iter().zip(item_bytes.iter()) {
            let planned = planned_by_id
                .get(data_item_id)
                .ok_or_else(|| PrepareBundleError::InvalidId(data_item_id.clone(), "missing planned_data_item row".into()))?;
            offsets.push(PreparedOffset {
                data_item_id: data_item_id.clone(),
                start_offset_in_root_bundle: cursor as i64,
                raw_content_length: bytes.len() as i64,
                payload_data_start: planned.payload_data_start,
                payload_content_type: planned.payload_content_type.clone(),
            });
            cursor += bytes.len() as u64;
        }

        self.object_store
            .put_object(&bundle_payload_key(&plan.plan_id), bundle.freeze(), ObjectMetadata::default())
            .await?;
        self.repository.mark_plan_prepared(plan.plan_id).await?;

        self.queue
            .enqueue(
                QueueName::PostBundle,
                &plan.plan_id.to_string(),
                &PostBundlePayload {
                    plan_id: plan.plan_id,
                    payload_byte_count,
                    header_byte_count,
                    offsets,
                },
            )
            .await?;
        info!(plan_id = %plan.plan_id, payload_byte_count, "prepared bundle payload");
        Ok(())
    }
}

/// 32-byte little-endian encoding of the ANS-104 bundle header's fixed-width
/// size/count fields.
fn le_u256(value: u128) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[..16].copy_from_slice(&value.to_le_bytes());
    buf
}

#[derive(Debug, thiserror::Error)]
pub enum PrepareBundleError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(#[from] gateway_storage::ObjectStoreError),
    #[error("queue error: {0}")]
    Queue(#[from] gateway_queue::QueueError),
    #[error("plan {0} not found")]
    PlanNotFound(Uuid),
    #[error("invalid data item id {0}: {1}")]
    InvalidId(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_u256_round_trips_small_values_little_endian() {
        let encoded = le_u256(300);
        assert_eq!(u16::from_le_bytes([encoded[0], encoded[1]]), 300);
        assert!(encoded[16..].iter().all(|&b| b == 0));
    }
}

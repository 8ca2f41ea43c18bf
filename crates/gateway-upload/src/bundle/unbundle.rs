//! `unbundle-bdi` (concurrency 2): detects a data item whose payload is
//! itself an ANS-104 bundle ("bundle data item", tagged `Bundle-Format:
//! binary` / `Bundle-Version: 2.0.0` per the ANS-104 convention), expands
//! its entry table, and records one `data_item_offsets` row per child with
//! `parentDataItemId` set and a TTL, then optionally queues each child for
//! `optical-post`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use gateway_queue::{JobEnvelope, JobHandler, QueueClient, QueueName, RedisQueue};
use gateway_storage::{ObjectStore, offsets_store::OffsetsStoreError};
use gateway_types::ids::base64url;
use gateway_types::offsets::DataItemOffset;
use gateway_types::tags::Tag;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bundle::payloads::{OpticalPostPayload, UnbundleBdiPayload};
use crate::ingress;

/// How long a nested-bundle-derived offset row survives before
/// `cleanup-fs`-adjacent expiry sweeps may reclaim it.
const NESTED_OFFSET_TTL_DAYS: i64 = 30;

pub struct UnbundleBdiHandler {
    object_store: Arc<dyn ObjectStore>,
    offsets_store: gateway_storage::OffsetsStore,
    queue: RedisQueue,
}

impl UnbundleBdiHandler {
    pub fn new(object_store: Arc<dyn ObjectStore>, offsets_store: gateway_storage::OffsetsStore, queue: RedisQueue) -> Self {
        Self { object_store, offsets_store, queue }
    }
}

pub fn is_bundle_data_item(tags: &[Tag]) -> bool {
    Tag::find(tags, "Bundle-Format") == Some("binary") && Tag::find(tags, "Bundle-Version").is_some()
}

#[async_trait]
impl JobHandler<UnbundleBdiPayload> for UnbundleBdiHandler {
    type Error = UnbundleBdiError;

    async fn handle(&self, job: JobEnvelope<UnbundleBdiPayload>) -> Result<(), Self::Error> {
        let UnbundleBdiPayload { data_item_id, root_bundle_id } = job.payload;

        let raw = self.object_store.get_object(&ingress::object_key(&data_item_id)).await?;
        let mut reader = gateway_types::ans104::EnvelopeReader::new(std::io::Cursor::new(raw.clone()));
        let header = reader
            .read_header()
            .await
            .map_err(|e| UnbundleBdiError::InvalidEnvelope(data_item_id.clone(), e.to_string()))?;

        if !is_bundle_data_item(&header.tags) {
            return Ok(());
        }

        let payload = raw.slice(header.payload_data_start as usize..);
        let children = parse_bundle_entries(&payload)
            .map_err(|e| UnbundleBdiError::InvalidEnvelope(data_item_id.clone(), e))?;

        let expires_at = Some(Utc::now() + Duration::days(NESTED_OFFSET_TTL_DAYS));
        let mut rows = Vec::with_capacity(children.len());
        for child in &children {
            let mut child_reader =
                gateway_types::ans104::EnvelopeReader::new(std::io::Cursor::new(child.bytes.clone()));
            let child_header = child_reader
                .read_header()
                .await
                .map_err(|e| UnbundleBdiError::InvalidEnvelope(child.data_item_id.clone(), e.to_string()))?;

            rows.push(DataItemOffset {
                data_item_id: child.data_item_id.clone(),
                root_bundle_id: root_bundle_id.clone(),
                start_offset_in_root_bundle: child.start_offset_in_payload as i64,
                raw_content_length: child.bytes.len() as i64,
                payload_data_start: child_header.payload_data_start as i64,
                payload_content_type: Tag::find(&child_header.tags, "Content-Type").map(str::to_string),
                parent_data_item_id: Some(data_item_id.clone()),
                start_offset_in_parent_payload: Some(child.start_offset_in_payload as i64),
                expires_at,
            });
        }

        let applied = self.offsets_store.upsert_batch(&rows).await?;
        info!(%data_item_id, children = children.len(), applied, "unbundled nested bundle data item");

        for child in &children {
            self.queue
                .enqueue(QueueName::OpticalPost, &child.data_item_id, &OpticalPostPayload { data_item_id: child.data_item_id.clone() })
                .await
                .map_err(UnbundleBdiError::Queue)?;
        }
        Ok(())
    }
}

struct ChildEntry {
    data_item_id: String,
    start_offset_in_payload: u64,
    bytes: Bytes,
}

/// Parses an ANS-104 bundle binary: `count(32) || (size(32) || id(32)) * n
/// || item bytes...`, slicing out each child's raw envelope bytes.
fn parse_bundle_entries(payload: &Bytes) -> Result<Vec<ChildEntry>, String> {
    if payload.len() < 32 {
        return Err("payload too short for a bundle count header".into());
    }
    let count = u256_le_to_u64(&payload[0..32])?;
    let table_start = 32usize;
    let table_len = count as usize * 64;
    if payload.len() < table_start + table_len {
        return Err("payload too short for the declared entry table".into());
    }

    let mut entries = Vec::with_capacity(count as usize);
    let mut sizes = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let entry_start = table_start + i * 64;
        let size = u256_le_to_u64(&payload[entry_start..entry_start + 32])?;
        let id = &payload[entry_start + 32..entry_start + 64];
        sizes.push(size);
        entries.push(base64url(id));
    }

    let mut offset = table_start + table_len;
    let mut children = Vec::with_capacity(count as usize);
    for (id, size) in entries.into_iter().zip(sizes) {
        let end = offset + size as usize;
        if payload.len() < end {
            return Err(format!("entry {id} overruns the bundle payload"));
        }
        children.push(ChildEntry {
            data_item_id: id,
            start_offset_in_payload: offset as u64,
            bytes: payload.slice(offset..end),
        });
        offset = end;
    }
    Ok(children)
}

fn u256_le_to_u64(word: &[u8]) -> Result<u64, String> {
    if word[8..].iter().any(|&b| b != 0) {
        return Err("bundle header field exceeds u64 range".into());
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[..8]);
    Ok(u64::from_le_bytes(buf))
}

#[derive(Debug, thiserror::Error)]
pub enum UnbundleBdiError {
    #[error("storage error: {0}")]
    Storage(#[from] gateway_storage::ObjectStoreError),
    #[error(transparent)]
    OffsetsStore(#[from] OffsetsStoreError),
    #[error("queue error: {0}")]
    Queue(gateway_queue::QueueError),
    #[error("invalid envelope for {0}: {1}")]
    InvalidEnvelope(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_payload_shorter_than_the_count_header() {
        let payload = Bytes::from_static(&[0u8; 10]);
        assert!(parse_bundle_entries(&payload).is_err());
    }

    #[test]
    fn u256_round_trips_values_within_u64_range() {
        let mut word = [0u8; 32];
        word[..8].copy_from_slice(&42u64.to_le_bytes());
        assert_eq!(u256_le_to_u64(&word).unwrap(), 42);
    }

    #[test]
    fn u256_rejects_values_above_u64_range() {
        let mut word = [0u8; 32];
        word[9] = 1;
        assert!(u256_le_to_u64(&word).is_err());
    }
}

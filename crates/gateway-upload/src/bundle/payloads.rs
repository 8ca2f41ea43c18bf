//! Job payload shapes for the 11 upload-stage queues (`spec.md` §4.3, §6).
//!
//! Each payload carries exactly what its handler needs to be idempotent
//! under redelivery without a prerequisite read; where a later stage would
//! otherwise have to re-derive a value the previous stage already computed
//! (e.g. bundle byte counts), it rides along on the payload instead.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanBundleTick;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareBundlePayload {
    pub plan_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBundlePayload {
    pub plan_id: Uuid,
    pub payload_byte_count: u64,
    pub header_byte_count: u64,
    /// Per-item layout within the bundle payload, computed once by
    /// `prepare-bundle`; `post-bundle` fills in `root_bundle_id` once the
    /// transaction id is known and forwards these on to `put-offsets`.
    pub offsets: Vec<PreparedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedOffset {
    pub data_item_id: String,
    pub start_offset_in_root_bundle: i64,
    pub raw_content_length: i64,
    pub payload_data_start: i64,
    pub payload_content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedBundlePayload {
    pub bundle_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerifyBundleTick;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub data_item_id: String,
    pub root_bundle_id: String,
    pub start_offset_in_root_bundle: i64,
    pub raw_content_length: i64,
    pub payload_data_start: i64,
    pub payload_content_type: Option<String>,
    pub parent_data_item_id: Option<String>,
    pub start_offset_in_parent_payload: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutOffsetsPayload {
    pub offsets: Vec<OffsetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDataItemPayload {
    pub data_item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpticalPostPayload {
    pub data_item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbundleBdiPayload {
    pub data_item_id: String,
    pub root_bundle_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeUploadPayload {
    pub upload_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleanupFsTick;

//! `data_item_offsets`: the persisted mapping from a data item to where its
//! bytes live inside a bundle (`spec.md` §3, §4.5).
//!
//! Populated lazily by the `put-offsets` worker; readers must tolerate
//! absence (the row may not exist yet even for a permanent data item).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key `data_item_id`. Secondary lookups by `root_bundle_id`,
/// `parent_data_item_id`, `expires_at`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataItemOffset {
    pub data_item_id: String,
    pub root_bundle_id: String,
    pub start_offset_in_root_bundle: i64,
    pub raw_content_length: i64,
    pub payload_data_start: i64,
    pub payload_content_type: Option<String>,
    /// Set when this row was produced by `unbundle-bdi` for a data item
    /// nested inside another data item's payload.
    pub parent_data_item_id: Option<String>,
    pub start_offset_in_parent_payload: Option<i64>,
    /// TTL for nested-bundle-derived rows; `None` for root-level items.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Maximum rows accepted in a single `put-offsets` batch (`spec.md` §4.3, §5).
pub const MAX_OFFSETS_BATCH: usize = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_level_offset_has_no_parent() {
        let offset = DataItemOffset {
            data_item_id: "abc".into(),
            root_bundle_id: "bundle1".into(),
            start_offset_in_root_bundle: 0,
            raw_content_length: 10,
            payload_data_start: 100,
            payload_content_type: Some("text/plain".into()),
            parent_data_item_id: None,
            start_offset_in_parent_payload: None,
            expires_at: None,
        };
        assert!(offset.parent_data_item_id.is_none());
    }
}

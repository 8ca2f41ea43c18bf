//! Data-item lifecycle rows (`spec.md` §3, §8 invariant 1).
//!
//! An id appears in **exactly one** of `new_data_item`, `planned_data_item`,
//! `permanent_data_item`, `failed_data_item` at any instant; transitions are
//! monotonic (`new -> planned -> permanent`, or `-> failed` from any stage).
//! This module only holds the row shapes; the table that actually enforces
//! the one-of-four invariant lives in `gateway-upload`'s database layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ans104::SignatureType;
use crate::money::Winston;

/// Tag value identifying which dedicated-bundle policy (if any) a data item
/// belongs to (`spec.md` §6 dedicated-bundle policy table, §9 glossary).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PremiumFeatureType(pub String);

impl PremiumFeatureType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `new_data_item`: awaiting `plan-bundle`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct NewDataItem {
    pub data_item_id: String,
    pub owner_public_address: String,
    pub byte_count: i64,
    pub assessed_winston_price: Winston,
    pub payload_data_start: i64,
    pub payload_content_type: Option<String>,
    pub uploaded_date: DateTime<Utc>,
    pub deadline_height: i64,
    pub premium_feature_type: Option<String>,
    pub signature_type: String,
    pub signature: Vec<u8>,
    /// `planId`s this item was part of that subsequently failed; bounded by
    /// `RETRY_LIMIT_FOR_FAILED_DATA_ITEMS` (default 10).
    pub failed_bundles: Vec<String>,
}

impl NewDataItem {
    pub fn signature_type(&self) -> Option<SignatureType> {
        SignatureType::from_tag(self.signature_type.parse().ok()?)
    }
}

/// `planned_data_item`: belongs to an open plan, awaiting `prepare-bundle`
/// through `verify-bundle`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PlannedDataItem {
    pub data_item_id: String,
    pub owner_public_address: String,
    pub byte_count: i64,
    pub assessed_winston_price: Winston,
    pub payload_data_start: i64,
    pub payload_content_type: Option<String>,
    pub uploaded_date: DateTime<Utc>,
    pub deadline_height: i64,
    pub premium_feature_type: Option<String>,
    pub signature_type: String,
    pub signature: Vec<u8>,
    pub plan_id: uuid::Uuid,
    pub failed_bundles: Vec<String>,
}

/// `permanent_data_item`: the bundle containing it has crossed
/// `TX_PERMANENT_THRESHOLD`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PermanentDataItem {
    pub data_item_id: String,
    pub owner_public_address: String,
    pub byte_count: i64,
    pub assessed_winston_price: Winston,
    pub payload_data_start: i64,
    pub payload_content_type: Option<String>,
    pub uploaded_date: DateTime<Utc>,
    pub deadline_height: i64,
    pub premium_feature_type: Option<String>,
    pub bundle_id: String,
    pub block_height: i64,
}

/// `failed_data_item`: terminal failure, e.g. retry budget exhausted.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FailedDataItem {
    pub data_item_id: String,
    pub owner_public_address: String,
    pub byte_count: i64,
    pub assessed_winston_price: Winston,
    pub payload_data_start: i64,
    pub payload_content_type: Option<String>,
    pub uploaded_date: DateTime<Utc>,
    pub deadline_height: i64,
    pub premium_feature_type: Option<String>,
    pub failed_bundles: Vec<String>,
    pub failed_reason: String,
    pub failed_date: DateTime<Utc>,
}

/// Which of the four tables a data item currently lives in, used by the
/// `GET /v1/tx/<id>/status` handler.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataItemStatus {
    New,
    Planned,
    Permanent,
    Failed,
    /// Not present in any lifecycle table (unknown id, or not yet committed).
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premium_feature_type_round_trips_string() {
        let t = PremiumFeatureType("ardrive".into());
        assert_eq!(t.as_str(), "ardrive");
    }
}

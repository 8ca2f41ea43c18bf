//! Bundle plan and bundle rows (`spec.md` §3, §4.3).
//!
//! A plan is an in-flight grouping of `NewDataItem` ids; a bundle is the
//! posted transaction carrying that plan's payload once `post-bundle` has run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Winston;

/// Default packing limits (`spec.md` §6 configuration table).
pub const MAX_BUNDLE_SIZE: u64 = 2 * 1024 * 1024 * 1024;
pub const MAX_DATA_ITEMS_PER_BUNDLE: usize = 10_000;

pub const TX_CONFIRMATION_THRESHOLD: u64 = 1;
pub const TX_PERMANENT_THRESHOLD: u64 = 18;
pub const DROP_BUNDLE_TX_THRESHOLD: u64 = 50;
pub const RE_POST_DATA_ITEM_THRESHOLD: u64 = 125;
pub const RETRY_LIMIT_FOR_FAILED_DATA_ITEMS: u32 = 10;

/// An in-flight grouping of data item ids, produced by `plan-bundle` and
/// consumed by `prepare-bundle`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BundlePlan {
    pub plan_id: Uuid,
    pub data_item_ids: Vec<String>,
    pub premium_feature_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BundlePlan {
    /// `Σ byteCount <= MAX_BUNDLE_SIZE` or exactly one oversize item.
    pub fn fits(byte_counts: &[u64]) -> bool {
        if byte_counts.len() == 1 && byte_counts[0] > MAX_BUNDLE_SIZE {
            return true;
        }
        byte_counts.iter().sum::<u64>() <= MAX_BUNDLE_SIZE
            && byte_counts.len() <= MAX_DATA_ITEMS_PER_BUNDLE
    }
}

/// A posted Arweave-style bundle transaction.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Bundle {
    /// Arweave-style transaction id of the bundle.
    pub bundle_id: String,
    pub plan_id: Uuid,
    pub payload_byte_count: i64,
    pub header_byte_count: i64,
    pub transaction_byte_count: i64,
    pub block_height: Option<i64>,
    /// Chain tip observed at post time — the "posted at block H" the
    /// `DROP_BUNDLE_TX_THRESHOLD` window is measured from (`spec.md` §4.3,
    /// §8 scenario 5), distinct from `block_height` (the inclusion height,
    /// nullable until the chain confirms it).
    pub posted_tip_height: i64,
    pub reward: Winston,
    pub posted_at: Option<DateTime<Utc>>,
}

impl Bundle {
    /// Confirmed once the chain tip has advanced `TX_CONFIRMATION_THRESHOLD`
    /// blocks past the bundle's post height.
    pub fn is_confirmed(&self, tip_height: u64) -> bool {
        self.block_height
            .is_some_and(|h| tip_height >= h as u64 + TX_CONFIRMATION_THRESHOLD)
    }

    /// Permanent once the chain tip has advanced `TX_PERMANENT_THRESHOLD`
    /// blocks past the bundle's post height (`spec.md` §8 invariant 3).
    pub fn is_permanent(&self, tip_height: u64) -> bool {
        self.block_height
            .is_some_and(|h| tip_height >= h as u64 + TX_PERMANENT_THRESHOLD)
    }

    /// Dropped if still unconfirmed `DROP_BUNDLE_TX_THRESHOLD` blocks after
    /// the bundle was posted, measured from the tip observed at post time
    /// (not from the nullable inclusion height, which never arrives for a
    /// bundle the chain never included).
    pub fn should_drop(&self, tip_height: u64) -> bool {
        !self.is_confirmed(tip_height) && tip_height >= self.posted_tip_height as u64 + DROP_BUNDLE_TX_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_oversize_item_forms_its_own_bundle() {
        assert!(BundlePlan::fits(&[MAX_BUNDLE_SIZE + 1]));
    }

    #[test]
    fn many_items_respect_the_size_cap() {
        assert!(!BundlePlan::fits(&[MAX_BUNDLE_SIZE, 1]));
        assert!(BundlePlan::fits(&[MAX_BUNDLE_SIZE]));
    }

    #[test]
    fn bundle_permanence_tracks_tip_height() {
        let bundle = Bundle {
            bundle_id: "b".into(),
            plan_id: Uuid::nil(),
            payload_byte_count: 0,
            header_byte_count: 0,
            transaction_byte_count: 0,
            block_height: Some(100),
            posted_tip_height: 100,
            reward: Winston::ZERO,
            posted_at: None,
        };
        assert!(!bundle.is_permanent(110));
        assert!(bundle.is_permanent(118));
        assert!(bundle.is_confirmed(101));
    }

    #[test]
    fn unconfirmed_bundle_is_dropped_past_the_threshold() {
        let bundle = Bundle {
            bundle_id: "b".into(),
            plan_id: Uuid::nil(),
            payload_byte_count: 0,
            header_byte_count: 0,
            transaction_byte_count: 0,
            block_height: None,
            posted_tip_height: 100,
            reward: Winston::ZERO,
            posted_at: None,
        };
        assert!(!bundle.should_drop(149));
        assert!(bundle.should_drop(150));
    }

    #[test]
    fn confirmed_bundle_is_never_dropped() {
        let bundle = Bundle {
            bundle_id: "b".into(),
            plan_id: Uuid::nil(),
            payload_byte_count: 0,
            header_byte_count: 0,
            transaction_byte_count: 0,
            block_height: Some(100),
            posted_tip_height: 100,
            reward: Winston::ZERO,
            posted_at: None,
        };
        assert!(!bundle.should_drop(200));
    }
}

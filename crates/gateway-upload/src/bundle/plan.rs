//! `plan-bundle` (concurrency 1): greedy-packs unplanned data items into
//! candidate bundles, grouped by `premiumFeatureType` first so a dedicated
//! bundle never mixes with arbitrary traffic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use gateway_queue::{JobEnvelope, JobHandler, QueueClient, QueueName, RedisQueue};
use gateway_types::bundle::{BundlePlan, MAX_BUNDLE_SIZE, MAX_DATA_ITEMS_PER_BUNDLE};
use gateway_types::lifecycle::NewDataItem;
use tracing::info;
use uuid::Uuid;

use crate::bundle::payloads::{PlanBundleTick, PrepareBundlePayload};
use crate::bundle::repository::LifecycleRepository;

/// How many unplanned items a single tick considers; large enough to pack
/// several full-sized bundles per run without scanning the whole table.
const PLAN_FETCH_LIMIT: i64 = 20_000;

pub struct PlanBundleHandler {
    repository: LifecycleRepository,
    queue: RedisQueue,
}

impl PlanBundleHandler {
    pub fn new(repository: LifecycleRepository, queue: RedisQueue) -> Self {
        Self { repository, queue }
    }
}

#[async_trait]
impl JobHandler<PlanBundleTick> for PlanBundleHandler {
    type Error = PlanBundleError;

    async fn handle(&self, _job: JobEnvelope<PlanBundleTick>) -> Result<(), Self::Error> {
        let items = self.repository.oldest_new_data_items(PLAN_FETCH_LIMIT).await?;
        if items.is_empty() {
            return Ok(());
        }

        for bucket in greedy_pack(items) {
            let plan = BundlePlan {
                plan_id: Uuid::new_v4(),
                premium_feature_type: bucket.premium_feature_type.clone(),
                data_item_ids: bucket.data_item_ids,
                created_at: Utc::now(),
            };
            self.repository.create_plan(&plan).await?;
            self.queue
                .enqueue(
                    QueueName::PrepareBundle,
                    &plan.plan_id.to_string(),
                    &PrepareBundlePayload { plan_id: plan.plan_id },
                )
                .await?;
            info!(plan_id = %plan.plan_id, items = plan.data_item_ids.len(), "planned bundle");
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanBundleError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("queue error: {0}")]
    Queue(#[from] gateway_queue::QueueError),
}

struct Bucket {
    premium_feature_type: Option<String>,
    data_item_ids: Vec<String>,
    byte_sum: u64,
}

/// Groups items by `premiumFeatureType`, then within each group greedily
/// fills buckets up to `MAX_BUNDLE_SIZE`/`MAX_DATA_ITEMS_PER_BUNDLE`, keeping
/// the group's original (oldest-first) order. An item larger than
/// `MAX_BUNDLE_SIZE` on its own always starts (and ends) its own bucket.
fn greedy_pack(items: Vec<NewDataItem>) -> Vec<Bucket> {
    let mut groups: BTreeMap<Option<String>, Vec<NewDataItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.premium_feature_type.clone()).or_default().push(item);
    }

    let mut buckets = Vec::new();
    for (premium_feature_type, group_items) in groups {
        let mut current = Bucket {
            premium_feature_type: premium_feature_type.clone(),
            data_item_ids: Vec::new(),
            byte_sum: 0,
        };
        for item in group_items {
            let byte_count = item.byte_count as u64;
            if byte_count > MAX_BUNDLE_SIZE {
                if !current.data_item_ids.is_empty() {
                    buckets.push(current);
                    current = Bucket {
                        premium_feature_type: premium_feature_type.clone(),
                        data_item_ids: Vec::new(),
                        byte_sum: 0,
                    };
                }
                buckets.push(Bucket {
                    premium_feature_type: premium_feature_type.clone(),
                    data_item_ids: vec![item.data_item_id],
                    byte_sum: byte_count,
                });
                continue;
            }
            let would_overflow = current.byte_sum + byte_count > MAX_BUNDLE_SIZE
                || current.data_item_ids.len() + 1 > MAX_DATA_ITEMS_PER_BUNDLE;
            if would_overflow && !current.data_item_ids.is_empty() {
                buckets.push(current);
                current = Bucket {
                    premium_feature_type: premium_feature_type.clone(),
                    data_item_ids: Vec::new(),
                    byte_sum: 0,
                };
            }
            current.byte_sum += byte_count;
            current.data_item_ids.push(item.data_item_id);
        }
        if !current.data_item_ids.is_empty() {
            buckets.push(current);
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use gateway_types::money::Winston;

    fn item(id: &str, byte_count: u64, premium_feature_type: Option<&str>) -> NewDataItem {
        NewDataItem {
            data_item_id: id.to_string(),
            owner_public_address: "owner".to_string(),
            byte_count: byte_count as i64,
            assessed_winston_price: Winston::ZERO,
            payload_data_start: 0,
            payload_content_type: None,
            uploaded_date: DateTime::from_timestamp(0, 0).unwrap(),
            deadline_height: 0,
            premium_feature_type: premium_feature_type.map(str::to_string),
            signature_type: "1".to_string(),
            signature: Vec::new(),
            failed_bundles: Vec::new(),
        }
    }

    #[test]
    fn items_of_different_premium_feature_types_never_share_a_bucket() {
        let items = vec![item("a", 100, Some("warp")), item("b", 100, None)];
        let buckets = greedy_pack(items);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn oversize_item_gets_its_own_bucket() {
        let items = vec![item("a", MAX_BUNDLE_SIZE + 1, None), item("b", 10, None)];
        let buckets = greedy_pack(items);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].data_item_ids, vec!["a".to_string()]);
    }

    #[test]
    fn items_are_packed_until_the_size_cap_then_split() {
        let items = vec![
            item("a", MAX_BUNDLE_SIZE - 10, None),
            item("b", 20, None),
            item("c", 5, None),
        ];
        let buckets = greedy_pack(items);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].data_item_ids, vec!["a".to_string()]);
        assert_eq!(buckets[1].data_item_ids, vec!["b".to_string(), "c".to_string()]);
    }
}

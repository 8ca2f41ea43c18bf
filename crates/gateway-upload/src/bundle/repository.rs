//! Database access for the four data-item lifecycle tables plus
//! `bundle_plan`/`bundle` (`spec.md` §3). An id lives in exactly one
//! lifecycle table; every transition here runs inside a transaction so that
//! invariant never observably breaks.

use chrono::Utc;
use gateway_types::bundle::{Bundle, BundlePlan};
use gateway_types::lifecycle::{DataItemStatus, FailedDataItem, NewDataItem, PermanentDataItem, PlannedDataItem};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct LifecycleRepository {
    pool: PgPool,
}

impl LifecycleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_new_data_item(&self, item: &NewDataItem) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO new_data_item (
                data_item_id, owner_public_address, byte_count, assessed_winston_price,
                payload_data_start, payload_content_type, uploaded_date, deadline_height,
                premium_feature_type, signature_type, signature, failed_bundles
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (data_item_id) DO NOTHING
            "#,
        )
        .bind(&item.data_item_id)
        .bind(&item.owner_public_address)
        .bind(item.byte_count)
        .bind(item.assessed_winston_price.to_string())
        .bind(item.payload_data_start)
        .bind(&item.payload_content_type)
        .bind(item.uploaded_date)
        .bind(item.deadline_height)
        .bind(&item.premium_feature_type)
        .bind(&item.signature_type)
        .bind(&item.signature)
        .bind(&item.failed_bundles)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Selects up to `limit` unplanned items ordered by `uploadedDate`, for
    /// `plan-bundle`'s greedy packer (`spec.md` §4.3).
    pub async fn oldest_new_data_items(&self, limit: i64) -> Result<Vec<NewDataItem>, sqlx::Error> {
        sqlx::query_as::<_, NewDataItem>(
            "SELECT * FROM new_data_item ORDER BY uploaded_date ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Moves a batch of ids from `new_data_item` to `planned_data_item`
    /// under the given `planId`, and records the plan itself, all in one
    /// transaction (`spec.md` §4.3 plan-bundle).
    pub async fn create_plan(&self, plan: &BundlePlan) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO bundle_plan (plan_id, data_item_ids, premium_feature_type, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(plan.plan_id)
        .bind(&plan.data_item_ids)
        .bind(&plan.premium_feature_type)
        .bind(plan.created_at)
        .execute(&mut *tx)
        .await?;

        for data_item_id in &plan.data_item_ids {
            sqlx::query(
                r#"
                INSERT INTO planned_data_item
                SELECT data_item_id, owner_public_address, byte_count, assessed_winston_price,
                       payload_data_start, payload_content_type, uploaded_date, deadline_height,
                       premium_feature_type, signature_type, signature, $2, failed_bundles
                FROM new_data_item WHERE data_item_id = $1
                "#,
            )
            .bind(data_item_id)
            .bind(plan.plan_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM new_data_item WHERE data_item_id = $1")
                .bind(data_item_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<BundlePlan>, sqlx::Error> {
        sqlx::query_as::<_, BundlePlan>("SELECT plan_id, data_item_ids, premium_feature_type, created_at FROM bundle_plan WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn planned_items_for_plan(&self, plan_id: Uuid) -> Result<Vec<PlannedDataItem>, sqlx::Error> {
        sqlx::query_as::<_, PlannedDataItem>("SELECT * FROM planned_data_item WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_all(&self.pool)
            .await
    }

    /// `prepare-bundle` only flips the plan's status; the computed
    /// `payloadByteCount`/`headerByteCount` ride along on the
    /// `post-bundle` job payload rather than a second round trip.
    pub async fn mark_plan_prepared(&self, plan_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE bundle_plan SET status = 'prepared' WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_plan_failed(&self, plan_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE bundle_plan SET status = 'failed' WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_bundle(&self, bundle: &Bundle) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bundle (
                bundle_id, plan_id, payload_byte_count, header_byte_count,
                transaction_byte_count, block_height, posted_tip_height, reward, posted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (bundle_id) DO NOTHING
            "#,
        )
        .bind(&bundle.bundle_id)
        .bind(bundle.plan_id)
        .bind(bundle.payload_byte_count)
        .bind(bundle.header_byte_count)
        .bind(bundle.transaction_byte_count)
        .bind(bundle.block_height)
        .bind(bundle.posted_tip_height)
        .bind(bundle.reward.to_string())
        .bind(bundle.posted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_bundle_block_height(&self, bundle_id: &str, block_height: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE bundle SET block_height = $2 WHERE bundle_id = $1")
            .bind(bundle_id)
            .bind(block_height)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn outstanding_bundles(&self) -> Result<Vec<Bundle>, sqlx::Error> {
        sqlx::query_as::<_, Bundle>(
            r#"
            SELECT b.* FROM bundle b
            WHERE NOT EXISTS (
                SELECT 1 FROM permanent_data_item p WHERE p.bundle_id = b.bundle_id
            )
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn bundle_by_plan(&self, plan_id: Uuid) -> Result<Option<Bundle>, sqlx::Error> {
        sqlx::query_as::<_, Bundle>("SELECT * FROM bundle WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_bundle(&self, bundle_id: &str) -> Result<Option<Bundle>, sqlx::Error> {
        sqlx::query_as::<_, Bundle>("SELECT * FROM bundle WHERE bundle_id = $1")
            .bind(bundle_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Moves every item of a confirmed-permanent bundle from
    /// `planned_data_item` to `permanent_data_item` atomically
    /// (`spec.md` §3 Bundle invariant, §8 invariant 3).
    pub async fn mark_bundle_permanent(&self, bundle_id: &str, block_height: i64) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let plan_id: Option<Uuid> = sqlx::query_scalar("SELECT plan_id FROM bundle WHERE bundle_id = $1")
            .bind(bundle_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(plan_id) = plan_id else {
            tx.rollback().await?;
            return Ok(0);
        };
        let result = sqlx::query(
            r#"
            INSERT INTO permanent_data_item
            SELECT data_item_id, owner_public_address, byte_count, assessed_winston_price,
                   payload_data_start, payload_content_type, uploaded_date, deadline_height,
                   premium_feature_type, $2, $3
            FROM planned_data_item WHERE plan_id = $1
            "#,
        )
        .bind(plan_id)
        .bind(bundle_id)
        .bind(block_height)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM planned_data_item WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Drops a bundle whose transaction never confirmed and re-plans its
    /// items, bumping each item's `failedBundles`/retry count
    /// (`spec.md` §4.3 verify-bundle drop path).
    pub async fn drop_bundle_and_replan(&self, bundle_id: &str, retry_limit: i32) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let plan_id: Option<Uuid> = sqlx::query_scalar("SELECT plan_id FROM bundle WHERE bundle_id = $1")
            .bind(bundle_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(plan_id) = plan_id else {
            tx.rollback().await?;
            return Ok(Vec::new());
        };

        let items = sqlx::query_as::<_, PlannedDataItem>("SELECT * FROM planned_data_item WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut requeued = Vec::new();
        let mut failed = Vec::new();
        for item in items {
            let mut failed_bundles = item.failed_bundles.clone();
            failed_bundles.push(bundle_id.to_string());
            if failed_bundles.len() as i32 >= retry_limit {
                sqlx::query(
                    r#"
                    INSERT INTO failed_data_item (
                        data_item_id, owner_public_address, byte_count, assessed_winston_price,
                        payload_data_start, payload_content_type, uploaded_date, deadline_height,
                        premium_feature_type, failed_bundles, failed_reason, failed_date
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(&item.data_item_id)
                .bind(&item.owner_public_address)
                .bind(item.byte_count)
                .bind(item.assessed_winston_price.to_string())
                .bind(item.payload_data_start)
                .bind(&item.payload_content_type)
                .bind(item.uploaded_date)
                .bind(item.deadline_height)
                .bind(&item.premium_feature_type)
                .bind(&failed_bundles)
                .bind("retry limit exhausted after bundle drop")
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                failed.push(item.data_item_id.clone());
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO new_data_item (
                        data_item_id, owner_public_address, byte_count, assessed_winston_price,
                        payload_data_start, payload_content_type, uploaded_date, deadline_height,
                        premium_feature_type, signature_type, signature, failed_bundles
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(&item.data_item_id)
                .bind(&item.owner_public_address)
                .bind(item.byte_count)
                .bind(item.assessed_winston_price.to_string())
                .bind(item.payload_data_start)
                .bind(&item.payload_content_type)
                .bind(item.uploaded_date)
                .bind(item.deadline_height)
                .bind(&item.premium_feature_type)
                .bind(&item.signature_type)
                .bind(&item.signature)
                .bind(&failed_bundles)
                .execute(&mut *tx)
                .await?;
                requeued.push(item.data_item_id.clone());
            }
        }
        sqlx::query("DELETE FROM planned_data_item WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM bundle WHERE bundle_id = $1")
            .bind(bundle_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(requeued)
    }

    /// `post-bundle`'s fatal-error path: a bundle never existed (posting
    /// itself failed), so there is nothing to drop from the `bundle` table —
    /// only the plan's items need re-queuing under the same retry-limit rule
    /// `drop_bundle_and_replan` applies (`spec.md` §4.3 FATAL_CHUNK_UPLOAD_ERRORS).
    pub async fn replan_failed_plan_items(&self, plan_id: Uuid, marker: &str, retry_limit: i32) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let items = sqlx::query_as::<_, PlannedDataItem>("SELECT * FROM planned_data_item WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut requeued = Vec::new();
        for item in items {
            let mut failed_bundles = item.failed_bundles.clone();
            failed_bundles.push(marker.to_string());
            if failed_bundles.len() as i32 >= retry_limit {
                sqlx::query(
                    r#"
                    INSERT INTO failed_data_item (
                        data_item_id, owner_public_address, byte_count, assessed_winston_price,
                        payload_data_start, payload_content_type, uploaded_date, deadline_height,
                        premium_feature_type, failed_bundles, failed_reason, failed_date
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(&item.data_item_id)
                .bind(&item.owner_public_address)
                .bind(item.byte_count)
                .bind(item.assessed_winston_price.to_string())
                .bind(item.payload_data_start)
                .bind(&item.payload_content_type)
                .bind(item.uploaded_date)
                .bind(item.deadline_height)
                .bind(&item.premium_feature_type)
                .bind(&failed_bundles)
                .bind("retry limit exhausted after fatal post-bundle error")
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO new_data_item (
                        data_item_id, owner_public_address, byte_count, assessed_winston_price,
                        payload_data_start, payload_content_type, uploaded_date, deadline_height,
                        premium_feature_type, signature_type, signature, failed_bundles
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(&item.data_item_id)
                .bind(&item.owner_public_address)
                .bind(item.byte_count)
                .bind(item.assessed_winston_price.to_string())
                .bind(item.payload_data_start)
                .bind(&item.payload_content_type)
                .bind(item.uploaded_date)
                .bind(item.deadline_height)
                .bind(&item.premium_feature_type)
                .bind(&item.signature_type)
                .bind(&item.signature)
                .bind(&failed_bundles)
                .execute(&mut *tx)
                .await?;
                requeued.push(item.data_item_id.clone());
            }
        }
        sqlx::query("DELETE FROM planned_data_item WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(requeued)
    }

    /// Permanent items uploaded before `cutoff`, for `cleanup-fs`'s backup
    /// filesystem retention sweep (`spec.md` §4.3, §4.5).
    pub async fn permanent_items_uploaded_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT data_item_id FROM permanent_data_item WHERE uploaded_date < $1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn status_of(&self, data_item_id: &str) -> Result<DataItemStatus, sqlx::Error> {
        if sqlx::query_scalar::<_, i64>("SELECT 1 FROM new_data_item WHERE data_item_id = $1")
            .bind(data_item_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some()
        {
            return Ok(DataItemStatus::New);
        }
        if sqlx::query_scalar::<_, i64>("SELECT 1 FROM planned_data_item WHERE data_item_id = $1")
            .bind(data_item_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some()
        {
            return Ok(DataItemStatus::Planned);
        }
        if sqlx::query_scalar::<_, i64>("SELECT 1 FROM permanent_data_item WHERE data_item_id = $1")
            .bind(data_item_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some()
        {
            return Ok(DataItemStatus::Permanent);
        }
        if sqlx::query_scalar::<_, i64>("SELECT 1 FROM failed_data_item WHERE data_item_id = $1")
            .bind(data_item_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some()
        {
            return Ok(DataItemStatus::Failed);
        }
        Ok(DataItemStatus::NotFound)
    }

    pub async fn permanent_item(&self, data_item_id: &str) -> Result<Option<PermanentDataItem>, sqlx::Error> {
        sqlx::query_as::<_, PermanentDataItem>("SELECT * FROM permanent_data_item WHERE data_item_id = $1")
            .bind(data_item_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn failed_item(&self, data_item_id: &str) -> Result<Option<FailedDataItem>, sqlx::Error> {
        sqlx::query_as::<_, FailedDataItem>("SELECT * FROM failed_data_item WHERE data_item_id = $1")
            .bind(data_item_id)
            .fetch_optional(&self.pool)
            .await
    }
}

//! The relational `data_item_offsets` store (`spec.md` §3, §4.5): primary
//! key `data_item_id`, secondary lookups by `root_bundle_id`,
//! `parent_data_item_id`, `expires_at`.

use gateway_types::offsets::{DataItemOffset, MAX_OFFSETS_BATCH};
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum OffsetsStoreError {
    #[error("batch of {0} offsets exceeds the {MAX_OFFSETS_BATCH}-row limit")]
    BatchTooLarge(usize),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct OffsetsStore {
    pool: PgPool,
}

impl OffsetsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(include_str!("../migrations/0001_data_item_offsets.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Idempotent batched upsert keyed by `data_item_id` (`spec.md` §4.3,
    /// §8: "after processing exactly 1 row per `dataItemId`"). Up to 500
    /// rows per batch; a duplicate submission is a no-op.
    pub async fn upsert_batch(&self, offsets: &[DataItemOffset]) -> Result<usize, OffsetsStoreError> {
        if offsets.len() > MAX_OFFSETS_BATCH {
            return Err(OffsetsStoreError::BatchTooLarge(offsets.len()));
        }
        let mut tx = self.pool.begin().await?;
        let mut applied = 0usize;
        for offset in offsets {
            let result = sqlx::query(
                r#"
                INSERT INTO data_item_offsets (
                    data_item_id, root_bundle_id, start_offset_in_root_bundle,
                    raw_content_length, payload_data_start, payload_content_type,
                    parent_data_item_id, start_offset_in_parent_payload, expires_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (data_item_id) DO UPDATE SET
                    root_bundle_id = EXCLUDED.root_bundle_id,
                    start_offset_in_root_bundle = EXCLUDED.start_offset_in_root_bundle,
                    raw_content_length = EXCLUDED.raw_content_length,
                    payload_data_start = EXCLUDED.payload_data_start,
                    payload_content_type = EXCLUDED.payload_content_type,
                    parent_data_item_id = EXCLUDED.parent_data_item_id,
                    start_offset_in_parent_payload = EXCLUDED.start_offset_in_parent_payload,
                    expires_at = EXCLUDED.expires_at
                "#,
            )
            .bind(&offset.data_item_id)
            .bind(&offset.root_bundle_id)
            .bind(offset.start_offset_in_root_bundle)
            .bind(offset.raw_content_length)
            .bind(offset.payload_data_start)
            .bind(&offset.payload_content_type)
            .bind(&offset.parent_data_item_id)
            .bind(offset.start_offset_in_parent_payload)
            .bind(offset.expires_at)
            .execute(&mut *tx)
            .await;

            // A per-row failure does not poison the batch (spec.md §4.3).
            match result {
                Ok(_) => applied += 1,
                Err(err) => {
                    tracing::warn!(data_item_id = %offset.data_item_id, error = %err, "offset row upsert failed");
                }
            }
        }
        tx.commit().await?;
        Ok(applied)
    }

    pub async fn get(&self, data_item_id: &str) -> Result<Option<DataItemOffset>, sqlx::Error> {
        sqlx::query_as::<_, DataItemOffset>(
            "SELECT * FROM data_item_offsets WHERE data_item_id = $1",
        )
        .bind(data_item_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn by_root_bundle(&self, root_bundle_id: &str) -> Result<Vec<DataItemOffset>, sqlx::Error> {
        sqlx::query_as::<_, DataItemOffset>(
            "SELECT * FROM data_item_offsets WHERE root_bundle_id = $1",
        )
        .bind(root_bundle_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn by_parent(&self, parent_data_item_id: &str) -> Result<Vec<DataItemOffset>, sqlx::Error> {
        sqlx::query_as::<_, DataItemOffset>(
            "SELECT * FROM data_item_offsets WHERE parent_data_item_id = $1",
        )
        .bind(parent_data_item_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Deletes rows past `expires_at`, used by nested-bundle TTL cleanup.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM data_item_offsets WHERE expires_at IS NOT NULL AND expires_at < now()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

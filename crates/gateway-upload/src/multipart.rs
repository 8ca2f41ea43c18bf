//! Multipart upload sessions (`spec.md` §3, §4.1, §6): database-backed
//! session/part bookkeeping layered over the object store's own multipart
//! handle.

use chrono::Utc;
use gateway_types::multipart::{DEFAULT_CHUNK_SIZE, MAX_PART_SIZE, MIN_PART_SIZE, MultipartPart, MultipartUpload};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("upload {0} not found")]
    NotFound(Uuid),
    #[error("finalize token mismatch")]
    BadToken,
    #[error("part size {0} bytes is outside the 5 MiB-500 MiB range")]
    PartSizeOutOfRange(u64),
    #[error("part numbers are not contiguous starting at 1")]
    NonContiguousParts,
}

#[derive(Clone)]
pub struct MultipartRepository {
    pool: PgPool,
}

impl MultipartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn generate_token() -> String {
        let bytes: [u8; 16] = rand::rng().random();
        hex::encode(bytes)
    }

    /// `object_upload_id`/`object_key` come from a prior
    /// `ObjectStore::create_multipart_upload` call; the session row exists
    /// only to layer bookkeeping (finalize token, part etags) over that
    /// object-store-native handle.
    pub async fn create(
        &self,
        user_address: Option<String>,
        chunk_size: Option<u64>,
        expected_byte_count: Option<u64>,
        object_upload_id: String,
        object_key: String,
    ) -> Result<MultipartUpload, MultipartError> {
        let upload_id = Uuid::new_v4();
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        let finalize_token = Self::generate_token();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO multipart_upload (upload_id, user_address, chunk_size, expected_byte_count, finalize_token, created_at, object_upload_id, object_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(upload_id)
        .bind(&user_address)
        .bind(chunk_size as i64)
        .bind(expected_byte_count.map(|v| v as i64))
        .bind(&finalize_token)
        .bind(created_at)
        .bind(&object_upload_id)
        .bind(&object_key)
        .execute(&self.pool)
        .await?;
        Ok(MultipartUpload {
            upload_id,
            user_address,
            chunk_size: chunk_size as i64,
            expected_byte_count: expected_byte_count.map(|v| v as i64),
            finalize_token,
            created_at,
            object_upload_id,
            object_key,
        })
    }

    pub async fn get(&self, upload_id: Uuid) -> Result<MultipartUpload, MultipartError> {
        sqlx::query_as::<_, MultipartUpload>("SELECT * FROM multipart_upload WHERE upload_id = $1")
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(MultipartError::NotFound(upload_id))
    }

    pub async fn record_part(&self, upload_id: Uuid, part_number: i32, etag: &str, size: u64) -> Result<(), MultipartError> {
        sqlx::query(
            "INSERT INTO multipart_part (upload_id, part_number, etag, size) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (upload_id, part_number) DO UPDATE SET etag = EXCLUDED.etag, size = EXCLUDED.size",
        )
        .bind(upload_id)
        .bind(part_number)
        .bind(etag)
        .bind(size as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn parts(&self, upload_id: Uuid) -> Result<Vec<MultipartPart>, MultipartError> {
        let parts = sqlx::query_as::<_, MultipartPart>(
            "SELECT * FROM multipart_part WHERE upload_id = $1 ORDER BY part_number ASC",
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(parts)
    }

    pub async fn verify_finalize_token(&self, upload_id: Uuid, token: &str) -> Result<MultipartUpload, MultipartError> {
        let upload = self.get(upload_id).await?;
        if upload.finalize_token != token {
            return Err(MultipartError::BadToken);
        }
        Ok(upload)
    }

    /// Drops the session once `finalize-upload` has consumed it, so a
    /// replayed finalize request 404s instead of re-ingesting.
    pub async fn delete(&self, upload_id: Uuid) -> Result<(), MultipartError> {
        sqlx::query("DELETE FROM multipart_part WHERE upload_id = $1").bind(upload_id).execute(&self.pool).await?;
        sqlx::query("DELETE FROM multipart_upload WHERE upload_id = $1").bind(upload_id).execute(&self.pool).await?;
        Ok(())
    }
}

/// Validates a finalize-time part list: contiguous part numbers starting at
/// 1, and every part but the last within `[MIN_PART_SIZE, MAX_PART_SIZE]`
/// (`spec.md` §3, §8 — the last part of a multipart upload may be smaller).
pub fn validate_parts_for_finalize(parts: &[MultipartPart]) -> Result<(), MultipartError> {
    if !MultipartUpload::parts_are_contiguous(parts) {
        return Err(MultipartError::NonContiguousParts);
    }
    let max_part_number = parts.iter().map(|p| p.part_number).max().unwrap_or(0);
    for part in parts {
        let size = part.size as u64;
        if size > MAX_PART_SIZE {
            return Err(MultipartError::PartSizeOutOfRange(size));
        }
        if part.part_number != max_part_number && size < MIN_PART_SIZE {
            return Err(MultipartError::PartSizeOutOfRange(size));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(part_number: i32, size: i64) -> MultipartPart {
        MultipartPart {
            upload_id: Uuid::nil(),
            part_number,
            etag: "etag".to_string(),
            size,
        }
    }

    #[test]
    fn last_part_may_be_smaller_than_the_minimum() {
        let parts = vec![part(1, MIN_PART_SIZE as i64), part(2, 10)];
        assert!(validate_parts_for_finalize(&parts).is_ok());
    }

    #[test]
    fn a_non_final_undersized_part_is_rejected() {
        let parts = vec![part(1, 10), part(2, MIN_PART_SIZE as i64)];
        assert!(validate_parts_for_finalize(&parts).is_err());
    }

    #[test]
    fn non_contiguous_part_numbers_are_rejected() {
        let parts = vec![part(1, MIN_PART_SIZE as i64), part(3, MIN_PART_SIZE as i64)];
        assert!(validate_parts_for_finalize(&parts).is_err());
    }
}

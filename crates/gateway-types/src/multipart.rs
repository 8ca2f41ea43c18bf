//! Multipart upload session rows (`spec.md` §3, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default and bounds for a multipart chunk size, in bytes.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const MAX_PART_SIZE: u64 = 500 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: u64 = 25 * 1024 * 1024;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub upload_id: Uuid,
    pub user_address: Option<String>,
    pub chunk_size: i64,
    pub expected_byte_count: Option<i64>,
    pub finalize_token: String,
    pub created_at: DateTime<Utc>,
    /// The object store's own multipart upload id, backing this session.
    pub object_upload_id: String,
    /// Staging key the parts are uploaded against before finalize copies
    /// the completed object to its content-addressed home.
    pub object_key: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct MultipartPart {
    pub upload_id: Uuid,
    pub part_number: i32,
    pub etag: String,
    pub size: i64,
}

impl MultipartUpload {
    /// Part numbers must be contiguous starting at 1.
    pub fn parts_are_contiguous(parts: &[MultipartPart]) -> bool {
        let mut sorted: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        sorted.sort_unstable();
        sorted.iter().enumerate().all(|(i, &n)| n == i as i32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: i32) -> MultipartPart {
        MultipartPart {
            upload_id: Uuid::nil(),
            part_number: n,
            etag: "etag".into(),
            size: MIN_PART_SIZE as i64,
        }
    }

    #[test]
    fn contiguous_parts_starting_at_one_pass() {
        assert!(MultipartUpload::parts_are_contiguous(&[part(1), part(2), part(3)]));
    }

    #[test]
    fn gap_in_part_numbers_fails() {
        assert!(!MultipartUpload::parts_are_contiguous(&[part(1), part(3)]));
    }

    #[test]
    fn starting_at_zero_fails() {
        assert!(!MultipartUpload::parts_are_contiguous(&[part(0), part(1)]));
    }
}

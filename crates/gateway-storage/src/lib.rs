//! The storage fabric: object store, backup filesystem mirror, hot cache,
//! and the relational `data_item_offsets` store (`spec.md` §4.5).
//!
//! Redundant writes to the backup filesystem and hot cache are scheduled in
//! parallel with the authoritative object-store write but MUST NOT block the
//! ingress success path (`spec.md` §9 open question): both are best-effort
//! and gated behind [`StorageFabricConfig`] flags.

pub mod backup_fs;
pub mod hot_cache;
pub mod object_store;
pub mod offsets_store;

pub use backup_fs::BackupFs;
pub use hot_cache::HotCache;
pub use object_store::{ObjectMetadata, ObjectStore, ObjectStoreError, S3ObjectStore};
pub use offsets_store::OffsetsStore;

/// Which best-effort layers are enabled, per `spec.md` §9's open question
/// allowing an implementer to omit them behind a feature flag.
#[derive(Debug, Clone, Copy)]
pub struct StorageFabricConfig {
    pub backup_fs_enabled: bool,
    pub hot_cache_enabled: bool,
    /// Items at or under this size are eligible for the hot cache.
    pub hot_cache_max_item_bytes: u64,
}

impl Default for StorageFabricConfig {
    fn default() -> Self {
        Self {
            backup_fs_enabled: true,
            hot_cache_enabled: true,
            hot_cache_max_item_bytes: 256 * 1024,
        }
    }
}

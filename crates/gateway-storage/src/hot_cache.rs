//! Small-object hot cache (`spec.md` §4.5): an in-process, TTL-bounded,
//! non-durable read-through accelerator for payloads under
//! [`StorageFabricConfig::hot_cache_max_item_bytes`].
//!
//! Per `spec.md` §9's open question, this replaces the legacy DynamoDB
//! pathway's role as a secondary accelerator; it is never the source of
//! truth and readers must tolerate a miss.

use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

struct Entry {
    bytes: Bytes,
    expires_at: Instant,
}

pub struct HotCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl HotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn put(&self, data_item_id: &str, bytes: Bytes) {
        self.entries.insert(
            data_item_id.to_string(),
            Entry {
                bytes,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn get(&self, data_item_id: &str) -> Option<Bytes> {
        let entry = self.entries.get(data_item_id)?;
        if entry.expires_at < Instant::now() {
            drop(entry);
            self.entries.remove(data_item_id);
            return None;
        }
        Some(entry.bytes.clone())
    }

    /// Sweeps expired entries; call periodically from a background tick.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at >= now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HotCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = HotCache::default();
        cache.put("item1", Bytes::from_static(b"hi"));
        assert_eq!(cache.get("item1"), Some(Bytes::from_static(b"hi")));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = HotCache::new(Duration::from_millis(1));
        cache.put("item1", Bytes::from_static(b"hi"));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("item1"), None);
    }

    #[test]
    fn miss_on_unknown_key_does_not_panic() {
        let cache = HotCache::default();
        assert_eq!(cache.get("missing"), None);
    }
}

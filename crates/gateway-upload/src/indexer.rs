//! Downstream indexer notification: a non-goal per `spec.md` §1 (the
//! optical-bridge/analytics indexer is an external collaborator). This is
//! the seam `new-data-item` (batch-insert into an external index) and
//! `optical-post` (notify the optical bridge) program against.

use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("indexer notification failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait DownstreamIndexer: Send + Sync {
    async fn notify_new_data_item(&self, data_item_id: &str) -> Result<(), IndexerError>;

    async fn notify_optical_post(&self, data_item_id: &str) -> Result<(), IndexerError>;
}

#[derive(Default)]
pub struct InMemoryIndexer {
    new_data_items: Mutex<Vec<String>>,
    optical_posts: Mutex<Vec<String>>,
}

impl InMemoryIndexer {
    pub fn new_data_items(&self) -> Vec<String> {
        self.new_data_items.lock().unwrap().clone()
    }

    pub fn optical_posts(&self) -> Vec<String> {
        self.optical_posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownstreamIndexer for InMemoryIndexer {
    async fn notify_new_data_item(&self, data_item_id: &str) -> Result<(), IndexerError> {
        self.new_data_items.lock().unwrap().push(data_item_id.to_string());
        Ok(())
    }

    async fn notify_optical_post(&self, data_item_id: &str) -> Result<(), IndexerError> {
        self.optical_posts.lock().unwrap().push(data_item_id.to_string());
        Ok(())
    }
}

//! `new-data-item` (concurrency >= 5): tells the downstream indexer about a
//! newly-ingested data item. Fire-and-retry: the indexer is an external
//! collaborator, so a failure here is left to the queue's backoff rather
//! than touched by the bundle lifecycle state machine.

use async_trait::async_trait;
use gateway_queue::{JobEnvelope, JobHandler};
use std::sync::Arc;

use crate::bundle::payloads::NewDataItemPayload;
use crate::indexer::{DownstreamIndexer, IndexerError};

pub struct NewDataItemHandler {
    indexer: Arc<dyn DownstreamIndexer>,
}

impl NewDataItemHandler {
    pub fn new(indexer: Arc<dyn DownstreamIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl JobHandler<NewDataItemPayload> for NewDataItemHandler {
    type Error = IndexerError;

    async fn handle(&self, job: JobEnvelope<NewDataItemPayload>) -> Result<(), Self::Error> {
        self.indexer.notify_new_data_item(&job.payload.data_item_id).await
    }
}

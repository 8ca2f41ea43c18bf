//! `optical-post` (concurrency 5): notifies the optical bridge that a data
//! item is readable ahead of chain confirmation. Also the fan-out target
//! for `unbundle-bdi`'s discovered children.

use async_trait::async_trait;
use gateway_queue::{JobEnvelope, JobHandler};
use std::sync::Arc;

use crate::bundle::payloads::OpticalPostPayload;
use crate::indexer::{DownstreamIndexer, IndexerError};

pub struct OpticalPostHandler {
    indexer: Arc<dyn DownstreamIndexer>,
}

impl OpticalPostHandler {
    pub fn new(indexer: Arc<dyn DownstreamIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl JobHandler<OpticalPostPayload> for OpticalPostHandler {
    type Error = IndexerError;

    async fn handle(&self, job: JobEnvelope<OpticalPostPayload>) -> Result<(), Self::Error> {
        self.indexer.notify_optical_post(&job.payload.data_item_id).await
    }
}

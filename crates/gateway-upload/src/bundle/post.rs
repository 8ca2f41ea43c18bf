//! `post-bundle` (concurrency 2): wraps a prepared bundle payload in a
//! signed transaction and posts it to the blockchain gateway. A fatal
//! chunk/transaction error drops the plan's items back to `NewDataItem`
//! (up to the retry budget); a transient error is left for the queue's own
//! backoff to retry.

use async_trait::async_trait;
use gateway_queue::{JobEnvelope, JobHandler, QueueClient, QueueName, RedisQueue};
use gateway_types::bundle::Bundle;
use gateway_types::offsets::MAX_OFFSETS_BATCH;
use std::sync::Arc;
use tracing::{error, warn};

use crate::bundle::payloads::{OffsetEntry, PostBundlePayload, PutOffsetsPayload, SeedBundlePayload};
use crate::bundle::repository::LifecycleRepository;
use crate::config::Config;
use crate::gateway_client::{ArweaveGateway, GatewayError};

pub struct PostBundleHandler {
    repository: LifecycleRepository,
    gateway: Arc<dyn ArweaveGateway>,
    config: Arc<Config>,
    queue: RedisQueue,
}

impl PostBundleHandler {
    pub fn new(repository: LifecycleRepository, gateway: Arc<dyn ArweaveGateway>, config: Arc<Config>, queue: RedisQueue) -> Self {
        Self { repository, gateway, config, queue }
    }
}

#[async_trait]
impl JobHandler<PostBundlePayload> for PostBundleHandler {
    type Error = PostBundleError;

    async fn handle(&self, job: JobEnvelope<PostBundlePayload>) -> Result<(), Self::Error> {
        let PostBundlePayload { plan_id, payload_byte_count, header_byte_count, offsets } = job.payload;
        let transaction_byte_count = payload_byte_count + header_byte_count;

        let posted_tip_height = self
            .gateway
            .current_block_height()
            .await
            .map_err(|e| PostBundleError::Transient(e.to_string()))?;

        let posted = match self
            .gateway
            .post_transaction(&self.config.owner_wallet_id, transaction_byte_count, payload_byte_count)
            .await
        {
            Ok(posted) => posted,
            Err(GatewayError::Fatal(reason)) => {
                error!(%plan_id, %reason, "post-bundle: fatal transaction error, replanning items");
                self.repository.mark_plan_failed(plan_id).await?;
                let replanned = self
                    .repository
                    .replan_failed_plan_items(plan_id, &reason, self.config.retry_limit_for_failed_data_items)
                    .await?;
                warn!(%plan_id, replanned = replanned.len(), "replanned data items after fatal post failure");
                return Ok(());
            }
            Err(GatewayError::Transient(reason)) => {
                return Err(PostBundleError::Transient(reason));
            }
        };

        let bundle = Bundle {
            bundle_id: posted.bundle_id,
            plan_id,
            payload_byte_count: payload_byte_count as i64,
            header_byte_count: header_byte_count as i64,
            transaction_byte_count: transaction_byte_count as i64,
            block_height: None,
            posted_tip_height: posted_tip_height as i64,
            reward: posted.reward,
            posted_at: Some(chrono::Utc::now()),
        };
        self.repository.insert_bundle(&bundle).await?;

        self.queue
            .enqueue(QueueName::SeedBundle, &bundle.bundle_id, &SeedBundlePayload { bundle_id: bundle.bundle_id.clone() })
            .await
            .map_err(PostBundleError::Queue)?;

        let entries: Vec<OffsetEntry> = offsets
            .into_iter()
            .map(|o| OffsetEntry {
                data_item_id: o.data_item_id,
                root_bundle_id: bundle.bundle_id.clone(),
                start_offset_in_root_bundle: o.start_offset_in_root_bundle,
                raw_content_length: o.raw_content_length,
                payload_data_start: o.payload_data_start,
                payload_content_type: o.payload_content_type,
                parent_data_item_id: None,
                start_offset_in_parent_payload: None,
            })
            .collect();
        for (i, chunk) in entries.chunks(MAX_OFFSETS_BATCH).enumerate() {
            self.queue
                .enqueue(
                    QueueName::PutOffsets,
                    &format!("{}-{i}", bundle.bundle_id),
                    &PutOffsetsPayload { offsets: chunk.to_vec() },
                )
                .await
                .map_err(PostBundleError::Queue)?;
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostBundleError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("transient gateway error: {0}")]
    Transient(String),
    #[error("queue error: {0}")]
    Queue(gateway_queue::QueueError),
}

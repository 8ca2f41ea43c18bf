//! `verify-bundle` (concurrency 2): polls the blockchain gateway's tip and
//! each outstanding bundle's inclusion height, advancing confirmed bundles
//! to `permanent` and dropping (and replanning) bundles that have sat
//! unconfirmed past the drop threshold.

use async_trait::async_trait;
use gateway_queue::{JobEnvelope, JobHandler, QueueClient, QueueName, RedisQueue};
use std::sync::Arc;
use tracing::{info, warn};

use crate::bundle::payloads::{UnbundleBdiPayload, VerifyBundleTick};
use crate::bundle::repository::LifecycleRepository;
use crate::config::Config;
use crate::gateway_client::ArweaveGateway;

pub struct VerifyBundleHandler {
    repository: LifecycleRepository,
    gateway: Arc<dyn ArweaveGateway>,
    config: Arc<Config>,
    queue: RedisQueue,
}

impl VerifyBundleHandler {
    pub fn new(repository: LifecycleRepository, gateway: Arc<dyn ArweaveGateway>, config: Arc<Config>, queue: RedisQueue) -> Self {
        Self { repository, gateway, config, queue }
    }
}

#[async_trait]
impl JobHandler<VerifyBundleTick> for VerifyBundleHandler {
    type Error = VerifyBundleError;

    async fn handle(&self, _job: JobEnvelope<VerifyBundleTick>) -> Result<(), Self::Error> {
        let tip = self.gateway.current_block_height().await.map_err(|e| VerifyBundleError::Gateway(e.to_string()))?;

        for mut bundle in self.repository.outstanding_bundles().await? {
            let block_height = self
                .gateway
                .transaction_block_height(&bundle.bundle_id)
                .await
                .map_err(|e| VerifyBundleError::Gateway(e.to_string()))?;

            if let Some(height) = block_height {
                if bundle.block_height != Some(height as i64) {
                    self.repository.update_bundle_block_height(&bundle.bundle_id, height as i64).await?;
                }
                bundle.block_height = Some(height as i64);
                if bundle.is_permanent(tip) {
                    let items = self.repository.planned_items_for_plan(bundle.plan_id).await?;
                    let marked = self.repository.mark_bundle_permanent(&bundle.bundle_id, height as i64).await?;
                    info!(bundle_id = %bundle.bundle_id, items = marked, "bundle reached permanence");
                    for item in items {
                        self.queue
                            .enqueue(
                                QueueName::UnbundleBdi,
                                &item.data_item_id,
                                &UnbundleBdiPayload {
                                    data_item_id: item.data_item_id.clone(),
                                    root_bundle_id: bundle.bundle_id.clone(),
                                },
                            )
                            .await
                            .map_err(VerifyBundleError::Queue)?;
                    }
                    continue;
                }
            }

            if bundle.should_drop(tip) {
                let replanned = self
                    .repository
                    .drop_bundle_and_replan(&bundle.bundle_id, self.config.retry_limit_for_failed_data_items)
                    .await?;
                warn!(bundle_id = %bundle.bundle_id, replanned = replanned.len(), "dropped unconfirmed bundle");
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyBundleError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("queue error: {0}")]
    Queue(gateway_queue::QueueError),
}

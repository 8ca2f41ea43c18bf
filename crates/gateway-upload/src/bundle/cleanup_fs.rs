//! `cleanup-fs` (concurrency 1): sweeps the best-effort backup filesystem
//! mirror, deleting permanent data items older than the configured
//! retention window. Single-threaded since it walks the same retention
//! cutoff every tick; `BackupFs::delete` is a no-op if the file is already
//! gone, so double-processing a cutoff boundary is harmless.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gateway_queue::{JobEnvelope, JobHandler};
use gateway_storage::BackupFs;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bundle::payloads::CleanupFsTick;
use crate::bundle::repository::LifecycleRepository;
use crate::config::Config;

pub struct CleanupFsHandler {
    repository: LifecycleRepository,
    backup_fs: Arc<BackupFs>,
    config: Arc<Config>,
}

impl CleanupFsHandler {
    pub fn new(repository: LifecycleRepository, backup_fs: Arc<BackupFs>, config: Arc<Config>) -> Self {
        Self { repository, backup_fs, config }
    }
}

#[async_trait]
impl JobHandler<CleanupFsTick> for CleanupFsHandler {
    type Error = sqlx::Error;

    async fn handle(&self, _job: JobEnvelope<CleanupFsTick>) -> Result<(), Self::Error> {
        let cutoff = Utc::now() - Duration::seconds(self.config.backup_fs_retention_secs as i64);
        let candidates = self.repository.permanent_items_uploaded_before(cutoff).await?;

        let mut deleted = 0usize;
        for data_item_id in &candidates {
            match self.backup_fs.delete(data_item_id).await {
                Ok(()) => deleted += 1,
                Err(err) => warn!(%data_item_id, %err, "cleanup-fs: failed to delete backup mirror"),
            }
        }
        info!(candidates = candidates.len(), deleted, "cleanup-fs swept backup filesystem");
        Ok(())
    }
}

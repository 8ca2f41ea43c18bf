//! Write-only backup filesystem mirror (`spec.md` §4.5).
//!
//! Best-effort only: a write failure here is logged and swallowed, never
//! surfaced to the ingress caller, per `spec.md` §9's open question.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum BackupFsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct BackupFs {
    root: PathBuf,
}

impl BackupFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, data_item_id: &str) -> PathBuf {
        self.root.join(data_item_id)
    }

    pub async fn write(&self, data_item_id: &str, bytes: &[u8]) -> Result<(), BackupFsError> {
        fs::create_dir_all(&self.root).await?;
        let path = self.path_for(data_item_id);
        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        Ok(())
    }

    /// Fire-and-forget write used by the parallel ingress fan-out
    /// (`spec.md` §4.1d): logs and discards errors rather than propagating.
    pub async fn write_best_effort(&self, data_item_id: &str, bytes: &[u8]) {
        if let Err(err) = self.write(data_item_id, bytes).await {
            warn!(data_item_id, error = %err, "backup filesystem write failed, continuing");
        }
    }

    pub async fn exists(&self, data_item_id: &str) -> bool {
        fs::metadata(self.path_for(data_item_id)).await.is_ok()
    }

    /// Deletes backup copies of items that have reached `permanent` and are
    /// older than `retention`, run by the `cleanup-fs` worker.
    pub async fn delete(&self, data_item_id: &str) -> Result<(), BackupFsError> {
        let path = self.path_for(data_item_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let fs = BackupFs::new(dir.path());
        fs.write("item1", b"payload").await.unwrap();
        assert!(fs.exists("item1").await);
        let read = tokio::fs::read(dir.path().join("item1")).await.unwrap();
        assert_eq!(read, b"payload");
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fs = BackupFs::new(dir.path());
        assert!(fs.delete("never-written").await.is_ok());
    }
}

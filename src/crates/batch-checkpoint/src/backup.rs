//! Write-once emergency backups of uncommitted work.
//!
//! Written when a flush fails, when a processor panics, or on shutdown,
//! so that work done since the last checkpoint survives even if the
//! canonical store cannot be updated. Backups are for operators; nothing
//! reads them back automatically.

use crate::error::{CheckpointError, Result};
use crate::record::{FailureRecord, ResultRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Serialize)]
struct BackupDocument<'a> {
    reason: &'a str,
    written_at: DateTime<Utc>,
    result_count: usize,
    failure_count: usize,
    results: &'a [ResultRecord],
    failures: &'a [FailureRecord],
}

/// Emergency backup writer for one directory.
#[derive(Debug, Clone)]
pub struct EmergencyBackup {
    dir: PathBuf,
}

impl EmergencyBackup {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a new backup file and return its path. Never overwrites.
    pub async fn write(
        &self,
        reason: &str,
        results: &[ResultRecord],
        failures: &[FailureRecord],
    ) -> Result<PathBuf> {
        let written_at = Utc::now();
        let document = BackupDocument {
            reason,
            written_at,
            result_count: results.len(),
            failure_count: failures.len(),
            results,
            failures,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let path = self.dir.join(format!(
            "emergency_{}_{}.json",
            written_at.format("%Y%m%d_%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));

        self.write_new(&path, &bytes)
            .await
            .map_err(|source| CheckpointError::Backup {
                dir: self.dir.clone(),
                source,
            })?;

        warn!(
            path = %path.display(),
            reason = reason,
            results = results.len(),
            failures = failures.len(),
            "Emergency backup written"
        );
        Ok(path)
    }

    async fn write_new(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }
}

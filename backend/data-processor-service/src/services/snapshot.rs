//! Raw snapshot files under `<data_root>/raw`

use crate::error::Result;
use crate::models::RawRecord;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

const RAW_DIR: &str = "raw";
const PROCESSED_DIR: &str = "processed";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Owns the `raw/` and `processed/` layout below the data root
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_root: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// `<data_root>/raw`, created on first use
    pub async fn raw_dir(&self) -> Result<PathBuf> {
        let dir = self.data_root.join(RAW_DIR);
        ensure_dir(&dir).await?;
        Ok(dir)
    }

    /// `<data_root>/processed`, created on first use
    pub async fn processed_dir(&self) -> Result<PathBuf> {
        let dir = self.data_root.join(PROCESSED_DIR);
        ensure_dir(&dir).await?;
        Ok(dir)
    }

    pub fn snapshot_path(&self, now: DateTime<Local>) -> PathBuf {
        self.data_root.join(RAW_DIR).join(format!(
            "marketplace_data_{}.json",
            now.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Write `batch` as an indented JSON array. The content lands in a
    /// `.tmp` sibling first and is renamed into place.
    pub async fn write_snapshot(&self, batch: &[RawRecord], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }

        let body = serde_json::to_vec_pretty(batch)?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let mut file = options.open(&tmp_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, path).await?;

        info!(
            path = %path.display(),
            records = batch.len(),
            bytes = body.len(),
            "Raw snapshot written"
        );
        Ok(())
    }
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await?;
    Ok(())
}

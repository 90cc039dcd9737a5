//! Local JSON Lines store
//!
//! Appends records to `<dir>/<dataset>.jsonl`, one object per line. Useful
//! when no annotation server is available.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use nerprep_core::{AnnotationRecord, AnnotationStore, NerprepError, Result};

/// File-backed annotation store
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// File holding a dataset's records
    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("{dataset}.jsonl"))
    }
}

#[async_trait]
impl AnnotationStore for JsonlStore {
    async fn log(&self, records: &[AnnotationRecord], dataset: &str) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| NerprepError::io(&self.dir, e))?;

        let mut buf = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| NerprepError::StoreError(format!("failed to encode record: {e}")))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let path = self.dataset_path(dataset);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| NerprepError::io(&path, e))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| NerprepError::io(&path, e))?;
        file.flush().await.map_err(|e| NerprepError::io(&path, e))?;

        debug!(file = %path.display(), records = records.len(), "appended records");
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

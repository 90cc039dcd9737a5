//! Annotation store loader
//!
//! Reads intermediate JSON files and submits the records that carry at
//! least one prediction to an annotation store, one batch per file.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::files::{list_json_files, read_records};
use nerprep_core::{AnnotationRecord, AnnotationStore, Result, SentenceRecord, StoreConfig};

/// Counters for one import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// JSON files read
    pub files_seen: usize,
    /// Files that produced a batch
    pub files_submitted: usize,
    /// Records sent to the store
    pub records_submitted: usize,
    /// Records dropped for having no predictions
    pub records_dropped: usize,
}

/// Importer from the intermediate JSON into an annotation store
pub struct Importer {
    store: Arc<dyn AnnotationStore>,
    dataset: String,
    agent: Option<String>,
    show_progress: bool,
}

impl Importer {
    /// Create an importer for a dataset
    pub fn new(store: Arc<dyn AnnotationStore>, dataset: impl Into<String>) -> Self {
        Self {
            store,
            dataset: dataset.into(),
            agent: None,
            show_progress: false,
        }
    }

    /// Create from config
    pub fn from_config(config: &StoreConfig, store: Arc<dyn AnnotationStore>) -> Self {
        Self::new(store, config.dataset_name.clone()).with_agent(config.prediction_agent.clone())
    }

    /// Set the prediction agent attached to every record
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        let agent = agent.into();
        self.agent = (!agent.is_empty()).then_some(agent);
        self
    }

    /// Show a progress bar while walking a directory
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Keep records with predictions and convert them for the store
    pub fn select_records(&self, records: &[SentenceRecord], source: &str) -> Vec<AnnotationRecord> {
        records
            .iter()
            .filter(|r| r.has_predictions())
            .map(|r| {
                let record = AnnotationRecord::from_sentence_record(r).with_metadata("source", source);
                match &self.agent {
                    Some(agent) => record.with_agent(agent.clone()),
                    None => record,
                }
            })
            .collect()
    }

    /// Import one file; returns `(submitted, dropped)` record counts
    pub async fn import_file(&self, path: &Path) -> Result<(usize, usize)> {
        let records = read_records(path).await?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let batch = self.select_records(&records, &source);
        let dropped = records.len() - batch.len();

        if batch.is_empty() {
            debug!(file = %path.display(), "no records with predictions");
            return Ok((0, dropped));
        }

        self.store.log(&batch, &self.dataset).await?;
        debug!(
            file = %path.display(),
            records = batch.len(),
            dataset = %self.dataset,
            "submitted batch"
        );
        Ok((batch.len(), dropped))
    }

    /// Import every JSON file under `dir`. The first failure aborts the run.
    pub async fn import_directory(&self, dir: &Path) -> Result<ImportSummary> {
        let files = list_json_files(dir)?;
        info!(
            input = %dir.display(),
            files = files.len(),
            dataset = %self.dataset,
            store = self.store.name(),
            "starting import"
        );

        let mut summary = ImportSummary {
            files_seen: files.len(),
            ..Default::default()
        };
        let progress = crate::file_progress(files.len(), self.show_progress);

        for file in &files {
            progress.inc(1);
            let (submitted, dropped) = self.import_file(file).await?;
            if submitted > 0 {
                summary.files_submitted += 1;
            }
            summary.records_submitted += submitted;
            summary.records_dropped += dropped;
        }
        progress.finish_and_clear();

        info!(
            files = summary.files_submitted,
            records = summary.records_submitted,
            dropped = summary.records_dropped,
            dataset = %self.dataset,
            "import finished"
        );

        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

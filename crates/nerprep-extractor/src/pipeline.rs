//! Extraction pipeline
//!
//! Reads raw text files, segments them into sentences, tags each file's
//! sentences in one batch, and writes one JSON file per input. An input is
//! skipped when its output file already exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::files::{ensure_dir, list_files, write_records};
use nerprep_core::{
    AppConfig, EntityTagger, NerprepError, Result, Sentence, SentenceRecord, SentenceSegmenter,
    TaggedSpan, WritePolicy,
};

/// A sentence together with the spans the tagger found in it
#[derive(Debug, Clone)]
pub struct TaggedSentence {
    pub sentence: Sentence,
    pub spans: Vec<TaggedSpan>,
}

/// Convert tagged sentences into records, keeping each span's top label
pub fn create_records(tagged: &[TaggedSentence]) -> Vec<SentenceRecord> {
    tagged
        .iter()
        .map(|t| {
            let predictions = t.spans.iter().filter_map(TaggedSpan::to_prediction).collect();
            SentenceRecord::new(t.sentence.text.clone(), t.sentence.token_texts(), predictions)
        })
        .collect()
}

/// Counters for one extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Input files found
    pub files_seen: usize,
    /// Inputs whose output already existed
    pub files_skipped: usize,
    /// Output files written
    pub files_written: usize,
    /// Inputs processed but not written (no records, or missing)
    pub files_empty: usize,
    /// Records written across all files
    pub records_written: usize,
    /// Predictions written across all files
    pub predictions_written: usize,
}

/// Extraction driver
pub struct Extractor {
    segmenter: Arc<dyn SentenceSegmenter>,
    tagger: Arc<dyn EntityTagger>,
    labels: Vec<String>,
    json_dir: PathBuf,
    write_policy: WritePolicy,
    flatten_newlines: bool,
    show_progress: bool,
}

impl Extractor {
    /// Create an extractor writing into `json_dir`
    pub fn new(
        segmenter: Arc<dyn SentenceSegmenter>,
        tagger: Arc<dyn EntityTagger>,
        labels: Vec<String>,
        json_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            segmenter,
            tagger,
            labels,
            json_dir: json_dir.into(),
            write_policy: WritePolicy::default(),
            flatten_newlines: true,
            show_progress: false,
        }
    }

    /// Create from config
    pub fn from_config(
        config: &AppConfig,
        segmenter: Arc<dyn SentenceSegmenter>,
        tagger: Arc<dyn EntityTagger>,
    ) -> Self {
        Self::new(
            segmenter,
            tagger,
            config.extraction.labels.clone(),
            config.paths.json_dir.clone(),
        )
        .with_write_policy(config.extraction.write_policy)
        .with_flatten_newlines(config.extraction.flatten_newlines)
    }

    /// Set the output-writing policy
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Enable or disable newline flattening
    pub fn with_flatten_newlines(mut self, flatten: bool) -> Self {
        self.flatten_newlines = flatten;
        self
    }

    /// Show a progress bar while walking a directory
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Output location for an input: `<json_dir>/<file name>.json`
    pub fn output_path(&self, input: &Path) -> Option<PathBuf> {
        let name = input.file_name()?;
        let mut file_name = name.to_os_string();
        file_name.push(".json");
        Some(self.json_dir.join(file_name))
    }

    /// Segment and tag one file.
    ///
    /// A missing file is logged and yields no sentences. Every other failure
    /// propagates.
    pub async fn process_file(&self, path: &Path) -> Result<Vec<TaggedSentence>> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) => {
                let err = NerprepError::io(path, e);
                if err.is_not_found() {
                    warn!(file = %path.display(), "input file not found");
                    return Ok(Vec::new());
                }
                return Err(err);
            }
        };

        // Universal newlines: CRLF and lone CR become LF
        let data = data.replace("\r\n", "\n").replace('\r', "\n");
        let data = if self.flatten_newlines {
            data.replace('\n', " ")
        } else {
            data
        };

        let sentences = self.segmenter.segment(&data)?;
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();
        let spans = self.tagger.predict(&texts, &self.labels).await?;
        if spans.len() != sentences.len() {
            return Err(NerprepError::TaggerError(format!(
                "{} returned {} results for {} sentences",
                self.tagger.name(),
                spans.len(),
                sentences.len()
            )));
        }

        Ok(sentences
            .into_iter()
            .zip(spans)
            .map(|(sentence, spans)| TaggedSentence { sentence, spans })
            .collect())
    }

    /// Whether a file's records should be written under the current policy
    fn should_write(&self, records: &[SentenceRecord]) -> bool {
        match self.write_policy {
            WritePolicy::AnySentence => !records.is_empty(),
            WritePolicy::AnyPrediction => records.iter().any(SentenceRecord::has_predictions),
        }
    }

    /// Process one input unless its output exists. Returns records written, if any.
    pub async fn extract_file(&self, input: &Path) -> Result<Option<Vec<SentenceRecord>>> {
        let Some(output) = self.output_path(input) else {
            return Ok(None);
        };
        if self.is_done(input).await? {
            debug!(file = %input.display(), "output exists, skipping");
            return Ok(None);
        }

        let tagged = self.process_file(input).await?;
        let records = create_records(&tagged);

        if !self.should_write(&records) {
            debug!(file = %input.display(), records = records.len(), "nothing to write");
            return Ok(None);
        }

        write_records(&output, &records).await?;
        debug!(file = %output.display(), records = records.len(), "wrote records");
        Ok(Some(records))
    }

    /// Check whether an input was already processed
    pub async fn is_done(&self, input: &Path) -> Result<bool> {
        let Some(output) = self.output_path(input) else {
            return Ok(false);
        };
        tokio::fs::try_exists(&output)
            .await
            .map_err(|e| NerprepError::io(&output, e))
    }

    /// Drop JSON files inside the output directory when it lies under `root`
    async fn exclude_outputs(&self, root: &Path, inputs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let canonical_root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| NerprepError::io(root, e))?;
        let canonical_json = tokio::fs::canonicalize(&self.json_dir)
            .await
            .map_err(|e| NerprepError::io(&self.json_dir, e))?;

        if !canonical_json.starts_with(&canonical_root) {
            return Ok(inputs);
        }

        let before = inputs.len();
        let kept: Vec<PathBuf> = inputs
            .into_iter()
            .filter(|input| {
                let is_json = input.extension().is_some_and(|ext| ext == "json");
                let in_output = input
                    .strip_prefix(root)
                    .is_ok_and(|rel| canonical_root.join(rel).starts_with(&canonical_json));
                !(is_json && in_output)
            })
            .collect();

        if kept.len() < before {
            debug!(excluded = before - kept.len(), "ignoring files in the output directory");
        }
        Ok(kept)
    }

    /// Walk `root` and extract every input whose output does not exist yet
    pub async fn process_directory(&self, root: &Path) -> Result<ExtractionSummary> {
        ensure_dir(&self.json_dir).await?;
        let inputs = self.exclude_outputs(root, list_files(root)?).await?;

        info!(
            input = %root.display(),
            output = %self.json_dir.display(),
            files = inputs.len(),
            tagger = self.tagger.name(),
            "starting extraction"
        );

        let mut summary = ExtractionSummary {
            files_seen: inputs.len(),
            ..Default::default()
        };
        let progress = crate::file_progress(inputs.len(), self.show_progress);
        // Output path -> input that produced it during this run
        let mut written: HashMap<PathBuf, PathBuf> = HashMap::new();

        for input in &inputs {
            progress.inc(1);

            let output = self.output_path(input);
            if let Some(earlier) = output.as_ref().and_then(|o| written.get(o)) {
                warn!(
                    file = %input.display(),
                    earlier = %earlier.display(),
                    "output name already written by another input in this run, skipping"
                );
                summary.files_skipped += 1;
                continue;
            }

            if self.is_done(input).await? {
                debug!(file = %input.display(), "output exists, skipping");
                summary.files_skipped += 1;
                continue;
            }

            match self.extract_file(input).await? {
                Some(records) => {
                    if let Some(output) = output {
                        written.insert(output, input.clone());
                    }
                    summary.files_written += 1;
                    summary.records_written += records.len();
                    summary.predictions_written +=
                        records.iter().map(|r| r.predictions.len()).sum::<usize>();
                }
                None => summary.files_empty += 1,
            }
        }
        progress.finish_and_clear();

        info!(
            written = summary.files_written,
            skipped = summary.files_skipped,
            empty = summary.files_empty,
            records = summary.records_written,
            predictions = summary.predictions_written,
            "extraction finished"
        );

        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

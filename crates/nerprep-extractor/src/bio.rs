//! BIO export
//!
//! Converts intermediate records into token-level Begin/Inside/Outside tags
//! and renders them as two-column CoNLL text.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::files::{ensure_dir, list_json_files, read_records};
use crate::segment::CharIndex;
use nerprep_core::{NerprepError, Prediction, Result, SentenceRecord, Token};

/// Tag for tokens outside every entity
pub const OUTSIDE: &str = "O";

/// A sentence's tokens with one BIO tag each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BioSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
}

/// Recover character offsets of `tokens` by scanning `text` in order.
///
/// Returns `None` when a token cannot be found after the previous one.
pub fn align_tokens(text: &str, tokens: &[String]) -> Option<Vec<Token>> {
    let index = CharIndex::new(text);
    let mut cursor = 0;
    let mut aligned = Vec::with_capacity(tokens.len());

    for token in tokens {
        let start = cursor + text[cursor..].find(token.as_str())?;
        let end = start + token.len();
        aligned.push(Token::new(token.as_str(), index.char_at(start), index.char_at(end)));
        cursor = end;
    }

    Some(aligned)
}

/// Tag each token against the predictions.
///
/// A token belongs to a prediction when their character ranges overlap. When
/// predictions overlap each other, the one starting first is kept.
pub fn to_bio(tokens: &[Token], predictions: &[Prediction]) -> Vec<String> {
    let mut ordered: Vec<&Prediction> = predictions.iter().filter(|p| p.end > p.start).collect();
    ordered.sort_by_key(|p| (p.start, p.end));

    let mut spans: Vec<&Prediction> = Vec::with_capacity(ordered.len());
    for p in ordered {
        if spans.last().map_or(true, |kept| p.start >= kept.end) {
            spans.push(p);
        }
    }

    let mut tags = Vec::with_capacity(tokens.len());
    let mut open: Option<usize> = None;

    for token in tokens {
        let hit = spans
            .iter()
            .position(|p| token.start < p.end && p.start < token.end && token.end > token.start);

        match hit {
            Some(i) => {
                let prefix = if open == Some(i) { "I" } else { "B" };
                tags.push(format!("{prefix}-{}", spans[i].label));
                open = Some(i);
            }
            None => {
                tags.push(OUTSIDE.to_string());
                open = None;
            }
        }
    }

    tags
}

/// Convert one record, or `None` if its tokens do not align with its text
pub fn record_to_bio(record: &SentenceRecord) -> Option<BioSentence> {
    let tokens = align_tokens(&record.text, &record.tokens)?;
    let tags = to_bio(&tokens, &record.predictions);
    Some(BioSentence {
        tokens: record.tokens.clone(),
        tags,
    })
}

/// Render sentences as `token\ttag` lines, blank line between sentences
pub fn write_conll(sentences: &[BioSentence]) -> String {
    let mut out = String::new();
    for sentence in sentences {
        for (token, tag) in sentence.tokens.iter().zip(&sentence.tags) {
            out.push_str(token);
            out.push('\t');
            out.push_str(tag);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Counters for one BIO export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BioSummary {
    pub files_written: usize,
    pub sentences_written: usize,
    pub sentences_unaligned: usize,
}

/// Exporter from intermediate JSON files to `.bio` files
pub struct BioExporter {
    output_dir: PathBuf,
    include_empty: bool,
}

impl BioExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            include_empty: false,
        }
    }

    /// Also export sentences without predictions
    pub fn with_include_empty(mut self, include: bool) -> Self {
        self.include_empty = include;
        self
    }

    /// `<output_dir>/<json stem>.bio`
    pub fn output_path(&self, input: &Path) -> Option<PathBuf> {
        let stem = input.file_stem()?;
        let mut name = stem.to_os_string();
        name.push(".bio");
        Some(self.output_dir.join(name))
    }

    /// Convert the records of one file, counting the ones that fail to align
    pub fn convert(&self, records: &[SentenceRecord]) -> (Vec<BioSentence>, usize) {
        let mut sentences = Vec::new();
        let mut unaligned = 0;

        for record in records {
            if !self.include_empty && !record.has_predictions() {
                continue;
            }
            match record_to_bio(record) {
                Some(sentence) => sentences.push(sentence),
                None => {
                    warn!(text = %record.text, "tokens do not align with text, skipping");
                    unaligned += 1;
                }
            }
        }

        (sentences, unaligned)
    }

    /// Export every JSON file under `json_dir`
    pub async fn export_directory(&self, json_dir: &Path) -> Result<BioSummary> {
        ensure_dir(&self.output_dir).await?;
        let mut summary = BioSummary::default();

        for file in list_json_files(json_dir)? {
            let Some(output) = self.output_path(&file) else {
                continue;
            };

            let records = read_records(&file).await?;
            let (sentences, unaligned) = self.convert(&records);
            summary.sentences_unaligned += unaligned;

            if sentences.is_empty() {
                continue;
            }

            tokio::fs::write(&output, write_conll(&sentences))
                .await
                .map_err(|e| NerprepError::io(&output, e))?;
            summary.files_written += 1;
            summary.sentences_written += sentences.len();
        }

        info!(
            files = summary.files_written,
            sentences = summary.sentences_written,
            unaligned = summary.sentences_unaligned,
            output = %self.output_dir.display(),
            "bio export finished"
        );

        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

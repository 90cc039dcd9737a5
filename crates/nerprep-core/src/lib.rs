//! nerprep Core - Records, collaborator traits, and shared types
//!
//! This crate defines the abstractions shared by the extraction pipeline,
//! the importer, and the annotation-store backends:
//! - The intermediate JSON record schema (`SentenceRecord`, `Prediction`)
//! - Segmenter and tagger output types (`Sentence`, `Token`, `TaggedSpan`)
//! - The store-facing `AnnotationRecord`
//! - Common error types
//! - Traits for the external collaborators (segmenter, tagger, store)
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, ExtractionConfig, LoggingConfig, PathsConfig, StoreBackend,
    StoreConfig, TaggerBackend, TaggerConfig, WritePolicy,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for nerprep operations
#[derive(Error, Debug)]
pub enum NerprepError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Segmentation error: {0}")]
    SegmentationError(String),

    #[error("Tagger error: {0}")]
    TaggerError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NerprepError {
    /// Wrap an IO error, mapping `ErrorKind::NotFound` to [`NerprepError::NotFound`]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Wrap a JSON (de)serialization error for a file
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// True for the one failure the extractor recovers from locally
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, NerprepError>;

// ============================================================================
// Intermediate Record Schema
// ============================================================================

/// An entity span in a sentence.
///
/// Serialized as a 3-element array `[label, start, end]`. Offsets are
/// character positions into the sentence text the tagger saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, usize, usize)", into = "(String, usize, usize)")]
pub struct Prediction {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

impl Prediction {
    pub fn new(label: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }
}

impl From<(String, usize, usize)> for Prediction {
    fn from((label, start, end): (String, usize, usize)) -> Self {
        Self { label, start, end }
    }
}

impl From<Prediction> for (String, usize, usize) {
    fn from(p: Prediction) -> Self {
        (p.label, p.start, p.end)
    }
}

/// One segmented sentence and its predicted entities.
///
/// Fields are declared in lexicographic order so serialized keys come out
/// sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceRecord {
    /// Entity spans, top label only
    pub predictions: Vec<Prediction>,

    /// Raw sentence text as produced by the segmenter
    pub text: String,

    /// Token texts in order
    pub tokens: Vec<String>,
}

impl SentenceRecord {
    pub fn new(text: impl Into<String>, tokens: Vec<String>, predictions: Vec<Prediction>) -> Self {
        Self {
            predictions,
            text: text.into(),
            tokens,
        }
    }

    /// Whether the record carries at least one entity span
    pub fn has_predictions(&self) -> bool {
        !self.predictions.is_empty()
    }
}

// ============================================================================
// Segmenter / Tagger Output
// ============================================================================

/// A token with character offsets into its sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// A sentence produced by a segmenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    pub tokens: Vec<Token>,
}

impl Sentence {
    pub fn new(text: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            text: text.into(),
            tokens,
        }
    }

    /// Token texts in order
    pub fn token_texts(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.text.clone()).collect()
    }
}

/// A candidate label with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f32,
}

impl ScoredLabel {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// An entity span detected by a tagger, with every label it proposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSpan {
    pub start: usize,
    pub end: usize,
    pub labels: Vec<ScoredLabel>,
}

impl TaggedSpan {
    pub fn new(start: usize, end: usize, labels: Vec<ScoredLabel>) -> Self {
        Self { start, end, labels }
    }

    /// Highest-confidence label; ties keep the earlier one
    pub fn top_label(&self) -> Option<&ScoredLabel> {
        self.labels.iter().fold(None::<&ScoredLabel>, |best, candidate| match best {
            Some(b) if b.score >= candidate.score => Some(b),
            _ => Some(candidate),
        })
    }

    /// Collapse to a single-label prediction
    pub fn to_prediction(&self) -> Option<Prediction> {
        self.top_label()
            .map(|l| Prediction::new(l.label.clone(), self.start, self.end))
    }
}

// ============================================================================
// Annotation Store Records
// ============================================================================

/// A token-classification record as submitted to an annotation store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub text: String,
    pub tokens: Vec<String>,
    pub prediction: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_agent: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AnnotationRecord {
    /// Convert an intermediate record one-for-one
    pub fn from_sentence_record(record: &SentenceRecord) -> Self {
        Self {
            text: record.text.clone(),
            tokens: record.tokens.clone(),
            prediction: record.predictions.clone(),
            prediction_agent: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the prediction agent
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.prediction_agent = Some(agent.into());
        self
    }

    /// Attach a metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Sentence-boundary detection and tokenization
pub trait SentenceSegmenter: Send + Sync {
    /// Split raw text into ordered sentences with tokens
    fn segment(&self, text: &str) -> Result<Vec<Sentence>>;
}

/// Zero-shot entity tagger: labels are supplied at inference time
#[async_trait::async_trait]
pub trait EntityTagger: Send + Sync {
    /// Tag a batch of sentences. Returns one span list per input sentence, in order.
    async fn predict(&self, sentences: &[String], labels: &[String])
        -> Result<Vec<Vec<TaggedSpan>>>;

    /// Get tagger name for logging
    fn name(&self) -> &str;
}

/// Destination for annotation records
#[async_trait::async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Submit one batch of records under a dataset name
    async fn log(&self, records: &[AnnotationRecord], dataset: &str) -> Result<()>;

    /// Get store name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

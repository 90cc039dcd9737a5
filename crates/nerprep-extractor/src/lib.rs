//! nerprep Extractor - Zero-shot NER data preparation pipeline
//!
//! Segments raw text into sentences, tags them with a zero-shot entity
//! tagger, and writes the intermediate JSON consumed by the importer and
//! the BIO exporter.

pub mod bio;
pub mod files;
pub mod loader;
pub mod ner;
pub mod pipeline;
pub mod segment;

pub use bio::{align_tokens, to_bio, write_conll, BioExporter, BioSentence, BioSummary};
pub use loader::{ImportSummary, Importer};
pub use ner::{build_tagger, GazetteerTagger, HttpTagger};
pub use pipeline::{create_records, ExtractionSummary, Extractor, TaggedSentence};
pub use segment::{CharIndex, RuleSentenceSegmenter};

use indicatif::{ProgressBar, ProgressStyle};

/// Per-file progress bar on stderr, or a hidden one
pub(crate) fn file_progress(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("█▓▒░"));
    bar
}

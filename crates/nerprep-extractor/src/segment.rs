//! Sentence segmentation module
//!
//! Rule-based sentence splitting on Unicode sentence boundaries (UAX #29),
//! with a repair pass for abbreviations and initials, and word-boundary
//! tokenization with character offsets.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

use nerprep_core::{Result, Sentence, SentenceSegmenter, Token};

/// Abbreviations that end with a period but rarely end a sentence
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "vs", "u.s", "u.k", "u.n", "e.g", "i.e",
    // Military ranks and designations
    "adm", "gen", "lt", "col", "maj", "capt", "cmdr", "cdr", "sgt", "cpl", "pvt", "brig", "cmdre",
];

/// Abbreviations that also close sentences ("the answer was no.").
/// These join only when the next piece starts lowercase or with a digit.
const SENTENCE_FINAL_ABBREVIATIONS: &[&str] = &[
    "no", "nos", "etc", "est", "co", "corp", "inc", "ltd", "ret", "jr", "sr", "fig", "approx",
    "dept", "gov", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov",
    "dec",
];

// ============================================================================
// Character offsets
// ============================================================================

/// Byte-to-character offset lookup for a string
#[derive(Debug, Clone)]
pub struct CharIndex {
    /// Byte offset of each character
    starts: Vec<usize>,
}

impl CharIndex {
    pub fn new(text: &str) -> Self {
        Self {
            starts: text.char_indices().map(|(i, _)| i).collect(),
        }
    }

    /// Character position of a byte offset. Offsets at or past the end map to the char count.
    pub fn char_at(&self, byte: usize) -> usize {
        match self.starts.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        }
    }

    /// Number of characters
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

// ============================================================================
// Rule-based segmenter
// ============================================================================

/// Sentence segmenter built on Unicode text segmentation
pub struct RuleSentenceSegmenter {
    abbreviations: HashSet<String>,
}

impl RuleSentenceSegmenter {
    /// Create a segmenter with the default abbreviation list
    pub fn new() -> Self {
        Self {
            abbreviations: ABBREVIATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add an abbreviation (without the trailing period)
    pub fn with_abbreviation(mut self, abbreviation: &str) -> Self {
        self.abbreviations
            .insert(abbreviation.trim_end_matches('.').to_lowercase());
        self
    }

    /// Split text into raw sentence slices, re-joining abbreviation splits
    pub fn split_sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let pieces: Vec<(usize, &str)> = text.split_sentence_bound_indices().collect();
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        let mut pending: Option<usize> = None;

        for (i, &(start, piece)) in pieces.iter().enumerate() {
            let begin = pending.take().unwrap_or(start);
            let end = start + piece.len();
            let next = pieces.get(i + 1).map(|&(_, p)| p);

            if self.joins_next(&text[begin..end], next) {
                pending = Some(begin);
            } else {
                ranges.push((begin, end));
            }
        }
        if let Some(begin) = pending {
            ranges.push((begin, text.len()));
        }

        ranges
            .into_iter()
            .map(|(s, e)| text[s..e].trim())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Check whether a candidate sentence stops on an abbreviation or initial
    /// that continues into `next`
    fn joins_next(&self, candidate: &str, next: Option<&str>) -> bool {
        let Some(stem) = candidate.trim_end().strip_suffix('.') else {
            return false;
        };

        let last_word = stem
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| !c.is_alphanumeric());

        if last_word.is_empty() {
            return false;
        }

        // Single initial, e.g. "J."
        let mut chars = last_word.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return c.is_uppercase();
        }

        let word = last_word.to_lowercase();
        if self.abbreviations.contains(&word) {
            return true;
        }

        SENTENCE_FINAL_ABBREVIATIONS.contains(&word.as_str())
            && next
                .and_then(|p| p.trim_start().chars().next())
                .is_some_and(|c| c.is_lowercase() || c.is_numeric())
    }

    /// Tokenize a sentence on word boundaries, dropping whitespace
    pub fn tokenize(&self, sentence: &str) -> Vec<Token> {
        let index = CharIndex::new(sentence);

        sentence
            .split_word_bound_indices()
            .filter(|(_, word)| !word.trim().is_empty())
            .map(|(start, word)| {
                Token::new(
                    word,
                    index.char_at(start),
                    index.char_at(start + word.len()),
                )
            })
            .collect()
    }
}

impl Default for RuleSentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter for RuleSentenceSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Sentence>> {
        let sentences = self
            .split_sentences(text)
            .into_iter()
            .map(|s| Sentence::new(s, self.tokenize(s)))
            .filter(|s| !s.tokens.is_empty())
            .collect();

        Ok(sentences)
    }
}

// ============================================================================
// Tests
// ============================================================================

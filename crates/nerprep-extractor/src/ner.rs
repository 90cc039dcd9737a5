//! Named Entity Recognition (NER) module
//!
//! Provides zero-shot taggers behind the `EntityTagger` trait:
//! - Gazetteer: regex patterns + dictionary terms per label
//! - HTTP: a remote zero-shot inference server (TARS, GLiNER, ...)
//!
//! Both honour the label set passed at inference time: a label that is not
//! requested is never emitted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::segment::CharIndex;
use nerprep_core::{
    EntityTagger, NerprepError, Result, ScoredLabel, TaggedSpan, TaggerBackend, TaggerConfig,
};

/// Score for dictionary term matches
const TERM_SCORE: f32 = 0.95;

/// Score for pattern matches
const PATTERN_SCORE: f32 = 0.85;

// ============================================================================
// Gazetteer NER
// ============================================================================

/// A compiled matching rule
#[derive(Debug, Clone)]
struct Rule {
    regex: Regex,
    label: String,
    score: f32,
}

/// Rule-based zero-shot tagger using regex patterns and dictionaries
pub struct GazetteerTagger {
    rules: Vec<Rule>,
    threshold: f32,
}

impl GazetteerTagger {
    /// Create an empty tagger
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            threshold: 0.0,
        }
    }

    /// Create a tagger with the default military gazetteer
    pub fn new() -> Self {
        let mut tagger = Self::empty();
        tagger.init_military_patterns();
        tagger.init_military_dictionary();
        tagger
    }

    /// Default gazetteer plus the terms and patterns from config
    pub fn from_config(config: &TaggerConfig) -> Result<Self> {
        let mut tagger = Self::new().with_threshold(config.threshold);

        for (label, terms) in &config.terms {
            for term in terms {
                tagger.add_term(label, term);
            }
        }
        for (label, patterns) in &config.patterns {
            for pattern in patterns {
                tagger.try_add_pattern(label, pattern, PATTERN_SCORE)?;
            }
        }

        Ok(tagger)
    }

    /// Set the minimum label score
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Initialize regex patterns for vessel and airframe designations
    fn init_military_patterns(&mut self) {
        // Ship prefixes followed by a capitalized name: "USS Example", "HMCS Ville"
        self.add_pattern(
            "Ship",
            r"\b(?:USS|USNS|HMS|HMCS|HMAS|HMNZS|INS|KRI|KD|RSS|BRP|JS|ROKS|FS|HNLMS|ITS|TCG)\s+[A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)*",
        );
        // Hull numbers: "FFG-62", "DDG 51"
        self.add_pattern("Ship", r"\b(?:FFG|DDG|CVN|LHD|LPD|LCS|SSN|CG|FFH)[- ]?\d{1,3}\b");

        // Western airframe designators: "F-35A", "P-8", "F/A-18"
        self.add_pattern(
            "Aircraft",
            r"\b(?:F/A|F|A|B|C|E|P|KC|EA|MQ|RQ|AH|UH|CH|MH|SH|HH|MV|CV)-\d{1,3}[A-Z]?\b",
        );
        // Soviet/Russian designators: "Su-30", "MiG-29"
        self.add_pattern("Aircraft", r"\b(?:Su|MiG|Tu|Il|Yak|Ka|Mi)-\d{1,3}[A-Z]?\b");

        // Small craft with pennant numbers: "PB-12", "LCU 1610"
        self.add_pattern("Boat", r"\b(?:PB|PC|LCU|LCM|RHIB)[- ]?\d{1,4}\b");
    }

    /// Initialize dictionary terms
    fn init_military_dictionary(&mut self) {
        for term in [
            "aircraft carrier",
            "amphibious assault ship",
            "destroyer",
            "frigate",
            "corvette",
            "cruiser",
            "submarine",
            "warship",
            "minesweeper",
            "offshore patrol vessel",
        ] {
            self.add_term("Ship", term);
        }

        for term in [
            "fighter jet",
            "helicopter",
            "maritime patrol aircraft",
            "drone",
            "Eurofighter Typhoon",
            "Rafale",
            "Gripen",
            "Black Hawk",
            "Seahawk",
            "Sea Hawk",
            "Chinook",
            "Osprey",
            "Hercules",
            "Poseidon",
        ] {
            self.add_term("Aircraft", term);
        }

        for term in [
            "patrol boat",
            "gunboat",
            "fast attack craft",
            "landing craft",
            "speedboat",
            "lifeboat",
            "inflatable boat",
            "boat",
        ] {
            self.add_term("Boat", term);
        }
    }

    /// Add a built-in regex pattern
    fn add_pattern(&mut self, label: &str, pattern: &str) {
        if let Ok(regex) = Regex::new(pattern) {
            self.rules.push(Rule {
                regex,
                label: label.to_string(),
                score: PATTERN_SCORE,
            });
        }
    }

    /// Add a user-supplied regex pattern
    pub fn try_add_pattern(&mut self, label: &str, pattern: &str, score: f32) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|e| {
            NerprepError::ConfigError(format!("invalid pattern for {label}: {e}"))
        })?;
        self.rules.push(Rule {
            regex,
            label: label.to_string(),
            score,
        });
        Ok(())
    }

    /// Add a dictionary term, matched case-insensitively on word boundaries
    pub fn add_term(&mut self, label: &str, term: &str) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }

        let pattern = format!(r"\b{}\b", regex::escape(term));
        if let Ok(regex) = RegexBuilder::new(&pattern).case_insensitive(true).build() {
            self.rules.push(Rule {
                regex,
                label: label.to_string(),
                score: TERM_SCORE,
            });
        }
    }

    /// Collect every rule match, merging labels on identical spans
    fn find_candidates(&self, text: &str, labels: &HashMap<String, &str>) -> Vec<TaggedSpan> {
        let index = CharIndex::new(text);
        let mut by_span: BTreeMap<(usize, usize), Vec<ScoredLabel>> = BTreeMap::new();

        for rule in &self.rules {
            if rule.score < self.threshold {
                continue;
            }
            let Some(label) = labels.get(&rule.label.to_lowercase()) else {
                continue;
            };

            for mat in rule.regex.find_iter(text) {
                if mat.as_str().trim().is_empty() {
                    continue;
                }
                let key = (index.char_at(mat.start()), index.char_at(mat.end()));
                let entry = by_span.entry(key).or_default();

                match entry.iter_mut().find(|l| l.label == *label) {
                    Some(existing) => existing.score = existing.score.max(rule.score),
                    None => entry.push(ScoredLabel::new(*label, rule.score)),
                }
            }
        }

        by_span
            .into_iter()
            .map(|((start, end), labels)| TaggedSpan::new(start, end, labels))
            .collect()
    }

    /// Remove overlapping spans: earlier start wins, then longer span, then higher score
    fn resolve_overlaps(&self, mut spans: Vec<TaggedSpan>) -> Vec<TaggedSpan> {
        let top = |s: &TaggedSpan| s.top_label().map(|l| l.score).unwrap_or(0.0);

        spans.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then((b.end - b.start).cmp(&(a.end - a.start)))
                .then(top(b).total_cmp(&top(a)))
        });

        let mut result: Vec<TaggedSpan> = Vec::new();
        for span in spans {
            let overlaps = result.last().is_some_and(|kept| span.start < kept.end);
            if !overlaps {
                result.push(span);
            }
        }
        result
    }

    /// Tag a single sentence
    pub fn tag(&self, text: &str, labels: &[String]) -> Vec<TaggedSpan> {
        let requested: HashMap<String, &str> = labels
            .iter()
            .map(|l| (l.to_lowercase(), l.as_str()))
            .collect();

        let candidates = self.find_candidates(text, &requested);
        self.resolve_overlaps(candidates)
    }
}

impl Default for GazetteerTagger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityTagger for GazetteerTagger {
    async fn predict(
        &self,
        sentences: &[String],
        labels: &[String],
    ) -> Result<Vec<Vec<TaggedSpan>>> {
        Ok(sentences.iter().map(|s| self.tag(s, labels)).collect())
    }

    fn name(&self) -> &str {
        "gazetteer"
    }
}

// ============================================================================
// HTTP zero-shot NER
// ============================================================================

/// Client for a remote zero-shot NER inference server
pub struct HttpTagger {
    client: Client,
    endpoint: String,
    model: String,
    api_token: Option<String>,
    threshold: f32,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    labels: &'a [String],
    threshold: f32,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<RemoteEntity>>,
}

#[derive(Debug, Deserialize)]
struct RemoteEntity {
    start: usize,
    end: usize,
    label: String,
    #[serde(default = "default_score")]
    score: f32,
}

fn default_score() -> f32 {
    1.0
}

impl HttpTagger {
    /// Create a new HTTP tagger
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_token: None,
            threshold: 0.5,
        }
    }

    /// Create from config
    pub fn from_config(config: &TaggerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NerprepError::TaggerError(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_token: config.api_token.clone(),
            threshold: config.threshold,
        })
    }

    /// Set bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Group remote entities into spans, ordered by position
    fn group_entities(entities: Vec<RemoteEntity>) -> Vec<TaggedSpan> {
        let mut by_span: BTreeMap<(usize, usize), Vec<ScoredLabel>> = BTreeMap::new();

        for entity in entities {
            if entity.end <= entity.start {
                continue;
            }
            by_span
                .entry((entity.start, entity.end))
                .or_default()
                .push(ScoredLabel::new(entity.label, entity.score));
        }

        by_span
            .into_iter()
            .map(|((start, end), labels)| TaggedSpan::new(start, end, labels))
            .collect()
    }

    /// Validate the response shape against the request
    fn parse_response(response: PredictResponse, expected: usize) -> Result<Vec<Vec<TaggedSpan>>> {
        if response.predictions.len() != expected {
            return Err(NerprepError::TaggerError(format!(
                "expected predictions for {} sentences, got {}",
                expected,
                response.predictions.len()
            )));
        }

        Ok(response
            .predictions
            .into_iter()
            .map(Self::group_entities)
            .collect())
    }
}

#[async_trait]
impl EntityTagger for HttpTagger {
    async fn predict(
        &self,
        sentences: &[String],
        labels: &[String],
    ) -> Result<Vec<Vec<TaggedSpan>>> {
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let request = PredictRequest {
            model: &self.model,
            texts: sentences,
            labels,
            threshold: self.threshold,
        };

        let mut builder = self
            .client
            .post(format!("{}/predict", self.endpoint))
            .json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        debug!(sentences = sentences.len(), model = %self.model, "sending tagger batch");

        let response = builder
            .send()
            .await
            .map_err(|e| NerprepError::TaggerError(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NerprepError::TaggerError(format!(
                "tagger returned {status}: {body}"
            )));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| NerprepError::TaggerError(format!("invalid response: {e}")))?;

        Self::parse_response(parsed, sentences.len())
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the configured tagger
pub fn build_tagger(config: &TaggerConfig) -> Result<Arc<dyn EntityTagger>> {
    Ok(match config.backend {
        TaggerBackend::Gazetteer => Arc::new(GazetteerTagger::from_config(config)?),
        TaggerBackend::Http => Arc::new(HttpTagger::from_config(config)?),
    })
}

// ============================================================================
// Tests
// ============================================================================

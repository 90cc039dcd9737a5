//! nerprep Configuration Management
//!
//! Handles configuration from a TOML file and environment variables.
//! Defaults reproduce the pipeline's historical hardcoded values, so a run
//! without any configuration reads `./data`, writes `./json`, tags
//! `Aircraft`, `Ship` and `Boat`, and imports into `military_ner`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Input/output directories
    pub paths: PathsConfig,

    /// Extraction behaviour
    pub extraction: ExtractionConfig,

    /// Entity tagger configuration
    pub tagger: TaggerConfig,

    /// Annotation store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Defaults, then the optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        base.with_env_override()
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Paths
        if let Some(dir) = get("NERPREP_INPUT_DIR") {
            self.paths.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("NERPREP_JSON_DIR") {
            self.paths.json_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("NERPREP_BIO_DIR") {
            self.paths.bio_dir = PathBuf::from(dir);
        }

        // Extraction
        if let Some(labels) = get("NERPREP_LABELS") {
            self.extraction.labels = parse_labels(&labels);
        }
        if let Some(policy) = get("NERPREP_WRITE_POLICY") {
            self.extraction.write_policy = policy.parse()?;
        }

        // Tagger
        if let Some(backend) = get("NERPREP_TAGGER") {
            self.tagger.backend = backend.parse()?;
        }
        if let Some(url) = get("NERPREP_TAGGER_URL") {
            self.tagger.endpoint = url;
        }
        if let Some(model) = get("NERPREP_TAGGER_MODEL") {
            self.tagger.model = model;
        }
        if let Some(token) = get("NERPREP_TAGGER_TOKEN") {
            self.tagger.api_token = Some(token);
        }

        // Store
        if let Some(backend) = get("NERPREP_STORE") {
            self.store.backend = backend.parse()?;
        }
        if let Some(url) = get("ARGILLA_API_URL") {
            self.store.api_url = url;
        }
        if let Some(key) = get("ARGILLA_API_KEY") {
            self.store.api_key = Some(key);
        }
        if let Some(workspace) = get("ARGILLA_WORKSPACE") {
            self.store.workspace = Some(workspace);
        }
        if let Some(dataset) = get("NERPREP_DATASET") {
            self.store.dataset_name = dataset;
        }

        // Logging
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Check cross-field constraints before a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extraction.labels.is_empty() {
            return Err(ConfigError::MissingRequired("extraction.labels".to_string()));
        }
        if !(0.0..=1.0).contains(&self.tagger.threshold) {
            return Err(ConfigError::InvalidValue {
                key: "tagger.threshold".to_string(),
                value: self.tagger.threshold.to_string(),
            });
        }
        if self.tagger.backend == TaggerBackend::Http && self.tagger.endpoint.is_empty() {
            return Err(ConfigError::MissingRequired("tagger.endpoint".to_string()));
        }
        if self.store.dataset_name.is_empty() {
            return Err(ConfigError::MissingRequired("store.dataset_name".to_string()));
        }
        if self.store.backend == StoreBackend::Argilla && self.store.api_url.is_empty() {
            return Err(ConfigError::MissingRequired("store.api_url".to_string()));
        }
        Ok(())
    }
}

/// Split a comma-separated label list
pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw text input tree
    pub input_dir: PathBuf,

    /// Intermediate JSON directory (extractor output, importer input)
    pub json_dir: PathBuf,

    /// BIO export directory
    pub bio_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./data"),
            json_dir: PathBuf::from("./json"),
            bio_dir: PathBuf::from("./bio"),
        }
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Entity labels passed to the zero-shot tagger
    pub labels: Vec<String>,

    /// When an output file gets written
    pub write_policy: WritePolicy,

    /// Replace newlines with spaces before segmentation
    pub flatten_newlines: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            labels: vec!["Aircraft".to_string(), "Ship".to_string(), "Boat".to_string()],
            write_policy: WritePolicy::AnySentence,
            flatten_newlines: true,
        }
    }
}

/// Output-writing policy for the extractor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Write whenever at least one sentence record was produced
    #[default]
    AnySentence,
    /// Write only when at least one record has a prediction
    AnyPrediction,
}

impl std::str::FromStr for WritePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "any_sentence" => Ok(Self::AnySentence),
            "any_prediction" => Ok(Self::AnyPrediction),
            _ => Err(ConfigError::InvalidValue {
                key: "NERPREP_WRITE_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Entity tagger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Tagger backend to use
    pub backend: TaggerBackend,

    /// Inference server base URL (http backend)
    pub endpoint: String,

    /// Model name sent to the inference server
    pub model: String,

    /// Bearer token for the inference server
    pub api_token: Option<String>,

    /// Minimum score for a label to be returned
    pub threshold: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Extra dictionary terms per label (gazetteer backend)
    pub terms: BTreeMap<String, Vec<String>>,

    /// Extra regex patterns per label (gazetteer backend)
    pub patterns: BTreeMap<String, Vec<String>>,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            backend: TaggerBackend::Gazetteer,
            endpoint: "http://localhost:8000".to_string(),
            model: "tars-ner".to_string(),
            api_token: None,
            threshold: 0.5,
            timeout_secs: 120,
            terms: BTreeMap::new(),
            patterns: BTreeMap::new(),
        }
    }
}

/// Supported tagger backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggerBackend {
    #[default]
    Gazetteer,
    Http,
}

impl std::str::FromStr for TaggerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gazetteer" | "rule" => Ok(Self::Gazetteer),
            "http" => Ok(Self::Http),
            _ => Err(ConfigError::InvalidValue {
                key: "NERPREP_TAGGER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Annotation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store backend to use
    pub backend: StoreBackend,

    /// Argilla server URL
    pub api_url: String,

    /// Argilla API key
    pub api_key: Option<String>,

    /// Argilla workspace
    pub workspace: Option<String>,

    /// Dataset every batch is logged under
    pub dataset_name: String,

    /// Agent name attached to predictions
    pub prediction_agent: String,

    /// Output directory (jsonl backend)
    pub jsonl_dir: PathBuf,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Argilla,
            api_url: "http://localhost:6900".to_string(),
            api_key: None,
            workspace: None,
            dataset_name: "military_ner".to_string(),
            prediction_agent: "tars-ner".to_string(),
            jsonl_dir: PathBuf::from("./store"),
            timeout_secs: 60,
        }
    }
}

/// Supported annotation store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Argilla,
    Jsonl,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argilla" | "rubrix" => Ok(Self::Argilla),
            "jsonl" => Ok(Self::Jsonl),
            _ => Err(ConfigError::InvalidValue {
                key: "NERPREP_STORE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.paths.input_dir, PathBuf::from("./data"));
        assert_eq!(config.paths.json_dir, PathBuf::from("./json"));
        assert_eq!(config.extraction.labels, vec!["Aircraft", "Ship", "Boat"]);
        assert_eq!(config.store.dataset_name, "military_ner");
        assert_eq!(config.extraction.write_policy, WritePolicy::AnySentence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::default()
            .with_overrides(lookup(&[
                ("NERPREP_LABELS", "Tank, Helicopter ,,"),
                ("NERPREP_TAGGER", "http"),
                ("NERPREP_WRITE_POLICY", "any-prediction"),
                ("NERPREP_DATASET", "naval"),
                ("ARGILLA_API_KEY", "secret"),
                ("NERPREP_JSON_DIR", ""),
            ]))
            .unwrap();

        assert_eq!(config.extraction.labels, vec!["Tank", "Helicopter"]);
        assert_eq!(config.tagger.backend, TaggerBackend::Http);
        assert_eq!(config.extraction.write_policy, WritePolicy::AnyPrediction);
        assert_eq!(config.store.dataset_name, "naval");
        assert_eq!(config.store.api_key.as_deref(), Some("secret"));
        // Empty values leave the default alone
        assert_eq!(config.paths.json_dir, PathBuf::from("./json"));
    }

    #[test]
    fn test_invalid_env_value() {
        let result = AppConfig::default().with_overrides(lookup(&[("NERPREP_STORE", "mongo")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("HTTP".parse::<TaggerBackend>().unwrap(), TaggerBackend::Http);
        assert_eq!("rubrix".parse::<StoreBackend>().unwrap(), StoreBackend::Argilla);
        assert!("invalid".parse::<TaggerBackend>().is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nerprep.toml");
        std::fs::write(
            &path,
            r#"
[extraction]
labels = ["Submarine"]
write_policy = "any_prediction"

[tagger.terms]
Submarine = ["U-boat"]
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.extraction.labels, vec!["Submarine"]);
        assert_eq!(config.extraction.write_policy, WritePolicy::AnyPrediction);
        assert!(config.extraction.flatten_newlines);
        assert_eq!(config.tagger.terms["Submarine"], vec!["U-boat"]);
        assert_eq!(config.store.dataset_name, "military_ner");
    }

    #[test]
    fn test_validate_rejects_empty_labels() {
        let mut config = AppConfig::default();
        config.extraction.labels.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}

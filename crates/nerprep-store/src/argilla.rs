//! Argilla (Rubrix) client
//!
//! Logs token-classification records through the dataset bulk endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nerprep_core::{AnnotationRecord, AnnotationStore, NerprepError, Result, StoreConfig};

/// Agent used when a record carries none
const DEFAULT_AGENT: &str = "nerprep";

/// Argilla API client
pub struct ArgillaStore {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    workspace: Option<String>,
}

#[derive(Debug, Serialize)]
struct BulkRequest<'a> {
    name: &'a str,
    records: Vec<TokenClassificationRecord<'a>>,
}

#[derive(Debug, Serialize)]
struct TokenClassificationRecord<'a> {
    text: &'a str,
    tokens: &'a [String],
    prediction: TokenPrediction<'a>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: &'a BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct TokenPrediction<'a> {
    agent: &'a str,
    entities: Vec<EntitySpan<'a>>,
}

#[derive(Debug, Serialize)]
struct EntitySpan<'a> {
    label: &'a str,
    start: usize,
    end: usize,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    processed: usize,
    #[serde(default)]
    failed: usize,
}

impl<'a> TokenClassificationRecord<'a> {
    fn from_record(record: &'a AnnotationRecord) -> Self {
        Self {
            text: &record.text,
            tokens: &record.tokens,
            prediction: TokenPrediction {
                agent: record.prediction_agent.as_deref().unwrap_or(DEFAULT_AGENT),
                entities: record
                    .prediction
                    .iter()
                    .map(|p| EntitySpan {
                        label: &p.label,
                        start: p.start,
                        end: p.end,
                    })
                    .collect(),
            },
            metadata: &record.metadata,
        }
    }
}

impl ArgillaStore {
    /// Create a new client
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            workspace: None,
        }
    }

    /// Create from config
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NerprepError::StoreError(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            workspace: config.workspace.clone(),
        })
    }

    /// Set API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set workspace
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Bulk endpoint for a dataset; the name is percent-encoded as one segment
    fn bulk_url(&self, dataset: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| NerprepError::StoreError(format!("invalid api url {}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|_| NerprepError::StoreError(format!("api url cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .extend(["api", "datasets", dataset, "TokenClassification:bulk"]);
        Ok(url)
    }
}

#[async_trait]
impl AnnotationStore for ArgillaStore {
    async fn log(&self, records: &[AnnotationRecord], dataset: &str) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let request = BulkRequest {
            name: dataset,
            records: records
                .iter()
                .map(TokenClassificationRecord::from_record)
                .collect(),
        };

        let mut builder = self.client.post(self.bulk_url(dataset)?).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("X-Argilla-Api-Key", key);
        }
        if let Some(workspace) = &self.workspace {
            builder = builder.query(&[("workspace", workspace)]);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NerprepError::StoreError(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NerprepError::StoreError(format!(
                "argilla returned {status}: {body}"
            )));
        }

        match response.json::<BulkResponse>().await {
            Ok(result) if result.failed > 0 => {
                warn!(dataset, processed = result.processed, failed = result.failed, "bulk log had failures");
            }
            Ok(result) => debug!(dataset, processed = result.processed, "bulk log done"),
            Err(e) => debug!(dataset, error = %e, "unrecognized bulk response"),
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "argilla"
    }
}

// ============================================================================
// Tests
// ============================================================================

//! nerprep Store - Annotation store backends
//!
//! Implements the `AnnotationStore` trait for:
//! - Argilla (formerly Rubrix) token-classification datasets over HTTP
//! - A local JSONL file per dataset, for offline and dry runs

pub mod argilla;
pub mod jsonl;

pub use argilla::ArgillaStore;
pub use jsonl::JsonlStore;

use std::sync::Arc;

use nerprep_core::{AnnotationStore, Result, StoreBackend, StoreConfig};

/// Build the configured store
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn AnnotationStore>> {
    Ok(match config.backend {
        StoreBackend::Argilla => Arc::new(ArgillaStore::from_config(config)?),
        StoreBackend::Jsonl => Arc::new(JsonlStore::new(&config.jsonl_dir)),
    })
}

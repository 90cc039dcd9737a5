//! File utilities shared by the extractor, the importer, and the BIO exporter

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use nerprep_core::{NerprepError, Result, SentenceRecord};

/// Every regular file under `root`, recursively, in file-name order
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(NerprepError::NotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| NerprepError::Other(e.into()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Files under `root` with a `.json` extension
pub fn list_json_files(root: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files(root)?
        .into_iter()
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect())
}

/// Serialize records with 2-space indentation and sorted keys
pub fn to_json(records: &[SentenceRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).map_err(|e| NerprepError::Other(e.into()))
}

/// Read and parse one intermediate JSON file
pub async fn read_records(path: &Path) -> Result<Vec<SentenceRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| NerprepError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| NerprepError::json(path, e))
}

/// Write one intermediate JSON file
pub async fn write_records(path: &Path, records: &[SentenceRecord]) -> Result<()> {
    let json = to_json(records)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| NerprepError::io(path, e))
}

/// Create a directory and its parents
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| NerprepError::io(path, e))
}

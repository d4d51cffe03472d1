// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};
use crate::pipeline::AnalysisRecord;
use crate::utils::error::StorageError;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// Saves the extraction JSON exactly as handed to downstream consumers
    pub fn save_result(&self, record: &AnalysisRecord) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(format!("{}_metrics.json", file_stem(&record.document)));

        let json = record
            .result
            .to_json()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, json)
            .map_err(StorageError::IoError)?;

        tracing::info!("Saved metrics to {}", file_path.display());

        Ok(file_path)
    }

    /// Saves metadata about the analysis in JSON format
    pub fn save_metadata(&self, record: &AnalysisRecord) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(format!("{}_meta.json", file_stem(&record.document)));

        let metadata = serde_json::json!({
            "document": record.document,
            "input": record.input,
            "source": record.source.as_str(),
            "page_count": record.page_count,
            "metrics_found": record.result.metrics_found(),
            "derived_found": record.result.derived_found(),
            "no_data": record.result.is_no_data(),
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, metadata_str)
            .map_err(StorageError::IoError)?;

        tracing::info!("Saved metadata to {}", file_path.display());

        Ok(file_path)
    }
}

// Keeps file names portable
fn file_stem(document: &str) -> String {
    let stem: String = document
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();

    if stem.is_empty() { "document".to_string() } else { stem }
}

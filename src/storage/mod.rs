// src/storage/mod.rs
use crate::session::SessionReport;
use crate::utils::error::StorageError;
use std::fs;
use std::path::{Path, PathBuf};

pub struct RecordStore {
    base_dir: PathBuf,
}

impl RecordStore {
    /// Creates a new RecordStore with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory for one template's output, e.g. `/base_dir/attorney_profiles/`.
    fn template_dir(&self, report: &SessionReport) -> Result<PathBuf, StorageError> {
        let dir = self.base_dir.join(sanitize(&report.template));
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(StorageError::IoError)?;
        }
        Ok(dir)
    }

    /// Writes every page record (fields with value, confidence, source and
    /// status, or the page's failure) to `records.json`.
    pub fn save_records(&self, report: &SessionReport) -> Result<PathBuf, StorageError> {
        let file_path = self.template_dir(report)?.join("records.json");

        let records = serde_json::to_string_pretty(&report.records)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, records).map_err(StorageError::IoError)?;

        tracing::info!("Saved {} record(s) to {}", report.records.len(), file_path.display());
        Ok(file_path)
    }

    /// Saves run metadata (counts, limiter statistics) in JSON format
    pub fn save_run_metadata(&self, report: &SessionReport) -> Result<PathBuf, StorageError> {
        let file_path = self.template_dir(report)?.join("run_meta.json");

        let metadata = serde_json::json!({
            "template": report.template,
            "template_version": report.template_version,
            "pages": report.records.len(),
            "resolved_pages": report.resolved_pages(),
            "failed_pages": report.failed_pages(),
            "cancelled_pages": report.cancelled_pages(),
            "resolved_fields": report.resolved_fields(),
            "rate_limits": report.rate_limits,
            "run_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, metadata_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved run metadata to {}", file_path.display());
        Ok(file_path)
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "template".to_string()
    } else {
        cleaned
    }
}

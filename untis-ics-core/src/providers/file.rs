use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{Error, RawLessonRecord, Result, providers::TimetableSource};

/// Lesson records read from a JSON array on disk
pub struct JsonFileSource {
    path: PathBuf,
    description: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let description = format!("Lesson records from {}", path.display());
        Self { path, description }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TimetableSource for JsonFileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn fetch_records(&self) -> Result<Vec<RawLessonRecord>> {
        let content = tokio::fs::read(&self.path).await.map_err(|e| Error::Provider {
            provider: self.name().to_string(),
            message: format!("Cannot read {}: {}", self.path.display(), e),
        })?;
        let records: Vec<RawLessonRecord> = serde_json::from_slice(&content)?;
        tracing::debug!(
            "Read {} lesson records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    async fn validate(&self) -> Result<()> {
        self.fetch_records().await.map(|_| ())
    }
}

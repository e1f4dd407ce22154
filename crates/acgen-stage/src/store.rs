//! The stage file.
//!
//! Persisted as one JSON array of [`FileStage`] records and held in memory
//! keyed by `service:table`.

use std::collections::BTreeMap;
use std::path::Path;

use acgen_core::{FileAccess, FileStage};

use crate::error::StageError;

/// Stage records of every generated table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageStore {
    stages: BTreeMap<String, FileStage>,
}

impl StageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the stage file at `path`; a missing file is an empty store.
    pub fn load<F: FileAccess + ?Sized>(files: &F, path: &Path) -> Result<Self, StageError> {
        let content = match files.read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %path.display(), "no stage file, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&content, path)
    }

    pub fn from_json(content: &str, path: &Path) -> Result<Self, StageError> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let records: Vec<FileStage> =
            serde_json::from_str(content).map_err(|e| StageError::Persistence {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(records.into_iter().collect())
    }

    pub fn to_json(&self, path: &Path) -> Result<String, StageError> {
        let records: Vec<&FileStage> = self.stages.values().collect();
        let mut json =
            serde_json::to_string_pretty(&records).map_err(|e| StageError::Persistence {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        json.push('\n');
        Ok(json)
    }

    pub fn save<F: FileAccess + ?Sized>(&self, files: &F, path: &Path) -> Result<(), StageError> {
        let json = self.to_json(path)?;
        files.write_file(path, json.as_bytes())?;
        tracing::info!(path = %path.display(), records = self.stages.len(), "wrote stage file");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FileStage> {
        self.stages.get(key)
    }

    pub fn insert(&mut self, stage: FileStage) {
        self.stages.insert(stage.key(), stage);
    }

    pub fn remove(&mut self, key: &str) -> Option<FileStage> {
        self.stages.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileStage> {
        self.stages.values()
    }

    pub fn for_service<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a FileStage> {
        self.stages.values().filter(move |s| s.service == service)
    }

    /// Services with at least one record.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.stages.values().map(|s| s.service.clone()).collect();
        services.dedup();
        services
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<FileStage> for StageStore {
    fn from_iter<I: IntoIterator<Item = FileStage>>(iter: I) -> Self {
        let mut store = Self::new();
        for stage in iter {
            store.insert(stage);
        }
        store
    }
}

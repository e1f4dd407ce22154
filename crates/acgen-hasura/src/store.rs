//! Loading and saving Hasura metadata.
//!
//! Version "1" keeps every table of a service in one `tables.yaml`.
//! Version "2" keeps one `<schema>_<table>.yaml` per table next to a
//! `tables.yaml` manifest of `!include` lines.

use std::path::PathBuf;

use acgen_core::{
    FileAccess, GRANTED_TABLE, HasuraConfig, HasuraTable, MetadataGraph, MetadataVersion,
    TableName,
};

use crate::error::HasuraError;
use crate::synthesizer::table_file_name;

/// Manifest of the per-table layout.
pub const MANIFEST_FILE: &str = "tables.yaml";

/// Reads and writes the metadata of one service through a [`FileAccess`].
pub struct MetadataStore<'a, F: FileAccess + ?Sized> {
    files: &'a F,
    config: &'a HasuraConfig,
}

impl<'a, F: FileAccess + ?Sized> MetadataStore<'a, F> {
    pub fn new(files: &'a F, config: &'a HasuraConfig) -> Self {
        Self { files, config }
    }

    /// File (v1) or directory (v2) holding the metadata of `service`.
    pub fn location(&self, service: &str) -> PathBuf {
        match self.config.version {
            MetadataVersion::V1 => self.config.v1_path_for(service),
            MetadataVersion::V2 => self.config.v2_dir_for(service),
        }
    }

    /// Load the metadata of `service`; missing metadata is an empty graph.
    pub fn load(&self, service: &str) -> Result<MetadataGraph, HasuraError> {
        match self.config.version {
            MetadataVersion::V1 => self.load_v1(service),
            MetadataVersion::V2 => self.load_v2(service),
        }
    }

    fn load_v1(&self, service: &str) -> Result<MetadataGraph, HasuraError> {
        let path = self.config.v1_path_for(service);
        let content = match self.files.read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.is_not_found() => {
                tracing::warn!(service, path = %path.display(), "no hasura metadata found");
                return Ok(MetadataGraph::default());
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(MetadataGraph::default());
        }
        serde_yaml::from_str(&content).map_err(|e| HasuraError::Metadata {
            file: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn load_v2(&self, service: &str) -> Result<MetadataGraph, HasuraError> {
        let dir = self.config.v2_dir_for(service);
        let names = match self.files.list_files(&dir) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => {
                tracing::warn!(service, dir = %dir.display(), "no hasura metadata found");
                return Ok(MetadataGraph::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut graph = MetadataGraph::default();
        for name in names {
            if name == MANIFEST_FILE || !name.ends_with(".yaml") {
                continue;
            }
            let path = dir.join(&name);
            let content = self.files.read_to_string(&path)?;
            let table: HasuraTable =
                serde_yaml::from_str(&content).map_err(|e| HasuraError::Metadata {
                    file: path.display().to_string(),
                    message: e.to_string(),
                })?;
            graph.push(table);
        }
        Ok(graph)
    }

    /// Write the parts of `graph` that differ from `baseline`.
    ///
    /// Returns the paths written.
    pub fn save(
        &self,
        service: &str,
        graph: &MetadataGraph,
        baseline: &MetadataGraph,
    ) -> Result<Vec<PathBuf>, HasuraError> {
        if graph == baseline {
            return Ok(Vec::new());
        }
        match self.config.version {
            MetadataVersion::V1 => {
                let path = self.config.v1_path_for(service);
                let content = to_yaml(graph, &path)?;
                self.files.write_file(&path, content.as_bytes())?;
                tracing::info!(service, path = %path.display(), "wrote hasura metadata");
                Ok(vec![path])
            }
            MetadataVersion::V2 => self.save_v2(service, graph, baseline),
        }
    }

    fn save_v2(
        &self,
        service: &str,
        graph: &MetadataGraph,
        baseline: &MetadataGraph,
    ) -> Result<Vec<PathBuf>, HasuraError> {
        let dir = self.config.v2_dir_for(service);
        let mut written = Vec::new();

        for table in &graph.tables {
            if baseline.table(&table.table.name) == Some(table) {
                continue;
            }
            let path = dir.join(table_file_name(&table.table));
            let content = to_yaml(table, &path)?;
            self.files.write_file(&path, content.as_bytes())?;
            tracing::info!(service, path = %path.display(), "wrote hasura table metadata");
            written.push(path);
        }

        if graph.contains(GRANTED_TABLE) && !baseline.contains(GRANTED_TABLE) {
            let manifest = dir.join(MANIFEST_FILE);
            let line = include_line(&TableName::public(GRANTED_TABLE));
            let current = match self.files.read_to_string(&manifest) {
                Ok(content) => content,
                Err(e) if e.is_not_found() => String::new(),
                Err(e) => return Err(e.into()),
            };
            if !current.lines().any(|l| l.trim() == line) {
                let separator = if current.is_empty() || current.ends_with('\n') { "" } else { "\n" };
                self.files
                    .append_text(&manifest, &format!("{separator}{line}\n"))?;
                written.push(manifest);
            }
        }
        Ok(written)
    }
}

/// Manifest line including the file of `table`.
pub fn include_line(table: &TableName) -> String {
    format!("- \"!include {}\"", table_file_name(table))
}

fn to_yaml<T: serde::Serialize>(value: &T, path: &std::path::Path) -> Result<String, HasuraError> {
    serde_yaml::to_string(value).map_err(|e| HasuraError::Metadata {
        file: path.display().to_string(),
        message: e.to_string(),
    })
}

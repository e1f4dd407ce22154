//! Error types shared by the acgen crates.

use std::path::PathBuf;

use thiserror::Error;

use crate::template::TemplateVersion;

/// Invalid or incomplete table specs.
#[derive(Debug, Error)]
pub enum SpecError {
    /// A template lacks inputs its strategy requires.
    #[error("table {table} (template {version}): missing {}", .fields.join(", "))]
    MissingFields {
        table: String,
        version: TemplateVersion,
        fields: Vec<&'static str>,
    },

    /// The same template version is declared twice for one table.
    #[error("table {table}: template {version} is declared more than once")]
    DuplicateTemplate {
        table: String,
        version: TemplateVersion,
    },

    /// The spec document could not be parsed.
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },
}

/// Errors from the file-access capability.
#[derive(Debug, Error)]
pub enum FileAccessError {
    /// The path does not exist.
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),

    /// Any other I/O failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid UTF-8.
    #[error("{} is not valid UTF-8", .0.display())]
    InvalidUtf8(PathBuf),
}

impl FileAccessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            FileAccessError::NotFound(path)
        } else {
            FileAccessError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FileAccessError::NotFound(_))
    }
}

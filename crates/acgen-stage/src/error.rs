//! Error types for stage persistence and batch compilation.

use acgen_core::{FileAccessError, SpecError};
use acgen_hasura::HasuraError;
use acgen_postgres::PolicyError;
use thiserror::Error;

/// How a failure affects the rest of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The spec of one table is incomplete or malformed; the table is skipped.
    InputValidation,
    /// A table named by the spec is missing from the metadata; the table is skipped.
    GraphLookup,
    /// Reading or writing an artifact failed; the batch is aborted.
    Persistence,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::InputValidation => write!(f, "input validation"),
            ErrorCategory::GraphLookup => write!(f, "graph lookup"),
            ErrorCategory::Persistence => write!(f, "persistence"),
        }
    }
}

/// Errors that can occur while compiling or rolling back.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Hasura(#[from] HasuraError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Files(#[from] FileAccessError),

    /// The stage file could not be parsed or serialized.
    #[error("invalid stage file {path}: {message}")]
    Persistence { path: String, message: String },
}

impl StageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StageError::Spec(_) | StageError::Policy(_) => ErrorCategory::InputValidation,
            StageError::Hasura(e) => match e {
                HasuraError::TableNotFound { .. } | HasuraError::NoAccessPath { .. } => {
                    ErrorCategory::GraphLookup
                }
                HasuraError::Spec(_) => ErrorCategory::InputValidation,
                HasuraError::Metadata { .. } | HasuraError::Files(_) => ErrorCategory::Persistence,
            },
            StageError::Files(_) | StageError::Persistence { .. } => ErrorCategory::Persistence,
        }
    }

    /// Whether the batch can continue with the next table.
    pub fn is_skippable(&self) -> bool {
        self.category() != ErrorCategory::Persistence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_categories() {
        let missing = StageError::from(SpecError::MissingFields {
            table: "students".to_string(),
            version: acgen_core::TemplateVersion::Location,
            fields: vec!["pkey"],
        });
        assert_eq!(missing.category(), ErrorCategory::InputValidation);
        assert!(missing.is_skippable());

        let lookup = StageError::from(HasuraError::NoAccessPath {
            table: "lessons".to_string(),
            target: "lesson_access_paths".to_string(),
            max_depth: 6,
        });
        assert_eq!(lookup.category(), ErrorCategory::GraphLookup);

        let io = StageError::from(HasuraError::Files(FileAccessError::NotFound(PathBuf::from(
            "tables.yaml",
        ))));
        assert_eq!(io.category(), ErrorCategory::Persistence);
        assert!(!io.is_skippable());
    }
}

//! Error types for Hasura metadata synthesis.

use acgen_core::{FileAccessError, SpecError};
use thiserror::Error;

/// Errors that can occur while synthesizing or persisting Hasura metadata.
#[derive(Debug, Error)]
pub enum HasuraError {
    /// A table named by the template is not in the metadata.
    #[error("table {table} (referenced by {referenced_by}) not found in hasura metadata")]
    TableNotFound {
        table: String,
        referenced_by: String,
    },

    /// No relationship path links the table to its access-path table.
    #[error("no relationship path from {table} to {target} within {max_depth} hops")]
    NoAccessPath {
        table: String,
        target: String,
        max_depth: usize,
    },

    /// Existing metadata could not be parsed or serialized.
    #[error("invalid hasura metadata in {file}: {message}")]
    Metadata { file: String, message: String },

    /// Reading or writing metadata files failed.
    #[error(transparent)]
    Files(#[from] FileAccessError),

    /// The template is incomplete.
    #[error(transparent)]
    Spec(#[from] SpecError),
}

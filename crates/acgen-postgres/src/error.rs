//! Error types for policy synthesis.

use acgen_core::SpecError;
use thiserror::Error;

/// Errors that can occur while synthesizing Postgres policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The template is incomplete.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A custom policy clause is not a valid Postgres expression.
    #[error("policy {policy}: invalid {clause} expression: {reason}")]
    InvalidExpression {
        policy: String,
        clause: &'static str,
        reason: String,
    },

    /// A custom policy has neither a USING nor a WITH CHECK clause.
    #[error("policy {policy} has no using or with_check clause")]
    EmptyPolicy { policy: String },

    /// Generated SQL failed to parse.
    #[error("failed to parse SQL: {0}")]
    ParseError(String),
}

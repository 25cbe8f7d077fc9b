//! Error types for the tracedb columnar engine.
//!
//! Query-time operations (`Filter`, `Sort`, `LookupJoin`) never return
//! errors — see spec §7. The only fallible public surface is view
//! construction.

use thiserror::Error;

/// Unified error type for all tracedb operations.
#[derive(Debug, Error)]
pub enum DbxError {
    /// Schema definition or validation error.
    #[error("schema error: {0}")]
    Schema(String),

    /// Type mismatch between an expected and an actual value.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// `View::create` failed: duplicate alias, unknown alias, missing
    /// column, duplicate output name, or an invalid join.
    #[error("view construction error: {0}")]
    ViewConstruction(String),
}

/// Result type alias for all tracedb operations.
pub type DbxResult<T> = Result<T, DbxError>;

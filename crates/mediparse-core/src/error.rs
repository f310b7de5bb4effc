//! Error types for the mediparse-core library.

use thiserror::Error;

/// Main error type for the mediparse library.
#[derive(Error, Debug)]
pub enum MediparseError {
    /// Rule document error.
    #[error("rule error: {0}")]
    Rules(#[from] RuleError),

    /// Rejected structural edit.
    #[error("edit rejected: {0}")]
    Edit(#[from] EditRejected),

    /// Backend API error.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to rule documents.
#[derive(Error, Debug)]
pub enum RuleError {
    /// The stored document matches neither the legacy nor the current shape.
    #[error("malformed rule document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A regex pattern in the document does not compile.
    #[error("invalid pattern in {location}: {reason}")]
    InvalidPattern { location: String, reason: String },

    /// No table type at the given position.
    #[error("no table type at index {0}")]
    TableTypeIndex(usize),

    /// No table type with the given identifier.
    #[error("unknown table type: {0}")]
    UnknownTableType(String),
}

/// Structural edits that would break a document invariant.
///
/// The document passed to the rejected operation is left untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditRejected {
    /// At least one table type must remain.
    #[error("the last table type cannot be deleted")]
    LastTableType,

    /// Every conditional rule keeps at least one action.
    #[error("the last action of a rule cannot be removed")]
    LastAction,
}

/// Errors talking to the document-processing backend.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or rejected credentials (401/403).
    #[error("not authenticated, please sign in again")]
    Unauthorized,

    /// Non-success response.
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// Transport failure.
    #[cfg(feature = "client")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend returned a document that could not be migrated.
    #[error("invalid rules from backend: {0}")]
    Rules(#[from] RuleError),
}

/// Result type for the mediparse library.
pub type Result<T> = std::result::Result<T, MediparseError>;

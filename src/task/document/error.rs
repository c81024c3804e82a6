//! Errors raised by the document codec.

use thiserror::Error;

/// Result type for codec operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors raised while parsing or rendering task documents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// The header block is missing or does not decode to a mapping.
    #[error("malformed task document: {0}")]
    MalformedDocument(String),

    /// A header value has no document representation.
    #[error("unsupported header value at '{path}': {detail}")]
    UnsupportedScalar {
        /// Location of the value inside the header.
        path: String,
        /// Why the value was rejected.
        detail: String,
    },

    /// The body scaffold template failed to render.
    #[error("body template error: {0}")]
    Template(String),
}

impl DocumentError {
    /// Creates a malformed-document error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument(reason.into())
    }
}

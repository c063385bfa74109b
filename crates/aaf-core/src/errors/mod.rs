use thiserror::Error;

/// Unified error type for the CFB, object model, and MXF layers.
///
/// One variant per error kind in the design's error table; I/O failures at
/// the OS boundary fold in via `#[from]` instead of being stringified so
/// callers can still match on `io::ErrorKind`.
#[derive(Error, Debug)]
pub enum AafError {
    #[error("bad format: {reason}")]
    BadFormat { reason: String },

    #[error("corruption: {reason}")]
    Corruption { reason: String },

    #[error("attach error: {reason}")]
    AttachError { reason: String },

    #[error("not found: {reason}")]
    NotFound { reason: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("read-only: {reason}")]
    ReadOnly { reason: String },

    #[error("unknown class: {auid}")]
    UnknownClass { auid: String },

    #[error("unresolved reference: {reason}")]
    UnresolvedReference { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AafError>;

impl AafError {
    pub fn bad_format(reason: impl Into<String>) -> Self {
        AafError::BadFormat { reason: reason.into() }
    }

    pub fn corruption(reason: impl Into<String>) -> Self {
        AafError::Corruption { reason: reason.into() }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        AafError::NotFound { reason: reason.into() }
    }
}

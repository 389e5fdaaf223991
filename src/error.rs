//! Error taxonomy for moment queries, effect pairing and the OLS solve
//!
//! Every failure surfaces to the caller. Nothing here is retried or
//! replaced with a plausible-looking number.

use thiserror::Error;

/// Errors produced by the jive library
#[derive(Error, Debug)]
pub enum JiveError {
    /// Empty, overlapping or otherwise unusable dimension/measure configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection could not be opened or used at query time
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backing store rejected the composed query
    #[error("Query rejected: {0}")]
    Query(String),

    /// A leave-one-out count reached zero or a moment came back non-finite
    #[error("Numeric degeneracy in {context}: {detail}")]
    NumericDegeneracy { context: String, detail: String },

    /// The design Gram matrix cannot be inverted reliably
    #[error("Singular {dimension}x{dimension} Gram matrix (condition number {condition_number:e})")]
    SingularMatrix {
        dimension: usize,
        condition_number: f64,
    },

    /// Treatment-effect pairing found inconsistent data
    #[error("Data error: {0}")]
    Data(String),
}

impl JiveError {
    /// True for both flavours of numeric failure (degenerate moments, singular Gram matrix)
    pub fn is_numeric_degeneracy(&self) -> bool {
        matches!(
            self,
            JiveError::NumericDegeneracy { .. } | JiveError::SingularMatrix { .. }
        )
    }

    pub(crate) fn degenerate(context: impl Into<String>, detail: impl Into<String>) -> Self {
        JiveError::NumericDegeneracy {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl From<rusqlite::Error> for JiveError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::PermissionDenied
                | ErrorCode::SystemIoFailure => JiveError::Connection(err.to_string()),
                _ => JiveError::Query(err.to_string()),
            },
            rusqlite::Error::InvalidPath(_) => JiveError::Connection(err.to_string()),
            _ => JiveError::Query(err.to_string()),
        }
    }
}

/// Result type for jive operations
pub type Result<T> = std::result::Result<T, JiveError>;

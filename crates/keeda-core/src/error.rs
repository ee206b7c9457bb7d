//! Error types for vault and import operations.

use thiserror::Error;

/// Errors returned by the tree engine, the container boundary and the importers.
///
/// Messages never carry password or OTP material.
#[derive(Debug, Error)]
pub enum VaultError {
    /// A group or entry id did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is structurally forbidden (e.g. deleting the root).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A group move would place the group inside its own subtree.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// Wrong credentials or a failed integrity check while unlocking.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Malformed import payload or container structure.
    #[error("parse failed: {0}")]
    ParseFailed(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

impl From<keepass::error::DatabaseOpenError> for VaultError {
    fn from(err: keepass::error::DatabaseOpenError) -> Self {
        match err {
            keepass::error::DatabaseOpenError::Key(e) => Self::DecryptionFailed(e.to_string()),
            other => Self::ParseFailed(other.to_string()),
        }
    }
}

impl From<keepass::error::DatabaseSaveError> for VaultError {
    fn from(err: keepass::error::DatabaseSaveError) -> Self {
        Self::InvalidOperation(format!("failed to serialize database: {err}"))
    }
}

impl From<csv::Error> for VaultError {
    fn from(err: csv::Error) -> Self {
        // Only the position is reported; csv::Error can echo field bytes.
        match err.position() {
            Some(pos) => Self::ParseFailed(format!("malformed CSV near line {}", pos.line())),
            None => Self::ParseFailed("malformed CSV".to_string()),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseFailed(format!(
            "invalid JSON at line {} column {}",
            err.line(),
            err.column()
        ))
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::ParseFailed(format!("I/O error: {err}"))
    }
}

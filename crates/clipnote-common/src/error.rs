//! Error types for clipnote
//!
//! This module defines the error taxonomy shared by the stores, the
//! repository and the storage factory.

use crate::types::RecordId;
use thiserror::Error;

/// Common result type for clipnote operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for clipnote
#[derive(Debug, Error)]
pub enum Error {
    /// Requested id has no payload. Read paths return `Ok(None)` instead.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Disk write/read/rename failed
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata index could not be opened
    #[error("metadata index unavailable: {0}")]
    IndexUnavailable(String),

    /// A metadata index operation failed after open
    #[error("metadata index error: {0}")]
    Index(String),

    /// A payload file or index row failed to decode
    #[error("corrupted {what}: {reason}")]
    Corrupted { what: String, reason: String },

    /// Payload is durable but its index entry could not be written
    #[error("payload for {id} written without index entry: {reason}")]
    PartialConsistency { id: RecordId, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an index error
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Create a corruption error
    pub fn corrupted(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupted {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a disk failure
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if this is a decode failure
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let id = RecordId::new();
        assert!(Error::NotFound(id).is_not_found());
        assert!(Error::Io(std::io::Error::other("disk full")).is_io());
        assert!(Error::corrupted("payload", "bad tag").is_corrupted());
        assert!(!Error::index("locked").is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::corrupted("payload abc", "unexpected eof");
        assert_eq!(err.to_string(), "corrupted payload abc: unexpected eof");
        let err = Error::IndexUnavailable("locked".into());
        assert_eq!(err.to_string(), "metadata index unavailable: locked");
    }
}

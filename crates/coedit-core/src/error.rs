//! Error types for coedit core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document already exists: {0}")]
    DocumentExists(String),

    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("User {user} not found in document {document}")]
    UserNotFound { document: String, user: String },

    #[error("Operation {operation} depends on {expected} operations from {author}, only {applied} applied")]
    MissingDependencies {
        operation: String,
        author: String,
        expected: u64,
        applied: u64,
    },

    #[error("Version {version} not found in document {document}")]
    VersionNotFound { document: String, version: String },

    #[error("Document {0} is busy, retry later")]
    Busy(String),

    #[error("Import is not supported: {0}")]
    ImportUnsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy(_) | Error::MissingDependencies { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias for coedit core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::Busy("plan:1".into()).is_retryable());
        assert!(Error::MissingDependencies {
            operation: "op-2".into(),
            author: "alice".into(),
            expected: 2,
            applied: 1,
        }
        .is_retryable());
        assert!(!Error::VersionNotFound {
            document: "plan:1".into(),
            version: "v".into(),
        }
        .is_retryable());
        assert!(!Error::DocumentNotFound("plan:1".into()).is_retryable());
        assert!(!Error::InvalidOperation("bad".into()).is_retryable());
    }
}

//! Error types for the formflow routing engine.
//!
//! Errors fall into four classes (see [`ErrorKind`]): validation and
//! resolution errors are caller mistakes, not-found errors point at a bad
//! reference, and infrastructure errors come from the stores and are passed
//! through untouched.

use thiserror::Error;

/// The main error type for formflow operations.
///
/// This enum uses `#[non_exhaustive]` so new variants can be added without
/// breaking downstream matches.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    /// The workflow configuration failed validation.
    #[error("Invalid workflow config: {0}")]
    InvalidConfig(String),

    /// A required identifier (subject, record) was absent or blank.
    #[error("Missing required identifier: {0}")]
    MissingIdentifier(&'static str),

    /// The engine could not be assembled from its parts.
    #[error("Invalid engine setup: {0}")]
    InvalidEngine(String),

    /// No approval node is active for the record.
    #[error("No active node")]
    NoActiveNode,

    /// The resolved node has no pending task to act on.
    #[error("No pending task")]
    NoPendingTask,

    /// The subject (dataset or form) does not exist.
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    /// The record does not exist under the given subject.
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// No workflow configuration has been saved for the subject.
    #[error("Workflow config not found: {0}")]
    ConfigNotFound(String),

    /// Error reported by a backing store.
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: malformed config or missing identifiers.
    Validation,
    /// The action does not apply to the record's current state.
    Resolution,
    /// A referenced subject, record or config does not exist.
    NotFound,
    /// A store failed; the caller owns any retry.
    Infrastructure,
}

impl FlowError {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::MissingIdentifier(_) | Self::InvalidEngine(_) => {
                ErrorKind::Validation
            }
            Self::NoActiveNode | Self::NoPendingTask => ErrorKind::Resolution,
            Self::SubjectNotFound(_) | Self::RecordNotFound(_) | Self::ConfigNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Store(_) | Self::Serialization(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns true if the error was caused by the caller's request rather
    /// than by a failing store.
    pub fn is_user_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Infrastructure)
    }
}

/// A specialized `Result` type for formflow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

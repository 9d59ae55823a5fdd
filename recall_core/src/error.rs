//! Error types for the recall_core library.

use crate::SessionPhase;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for recall_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Card id does not resolve to a card file
    #[error("Card not found: {0}")]
    NotFound(String),

    /// Deck id does not resolve to a deck directory
    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    /// Card header cannot be parsed or violates an invariant
    #[error("Corrupt card {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Durable write rejected because the file changed underneath us
    #[error("Conflict: {0} was modified since it was loaded")]
    Conflict(String),

    #[error("A review session is already active")]
    AlreadyActive,

    #[error("No review session is active")]
    NoSession,

    #[error("The review session is completed")]
    Completed,

    #[error("Operation requires phase {expected}, session is in {actual:?}")]
    WrongPhase {
        expected: &'static str,
        actual: SessionPhase,
    },

    /// Grade outside 0..=5 (only raised by the strict grading path)
    #[error("Invalid grade: {0} (expected 0..=5)")]
    InvalidGrade(i64),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Observable error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Corrupt,
    Io,
    AlreadyActive,
    NoSession,
    Completed,
    WrongPhase,
    InvalidGrade,
    Conflict,
    Config,
}

impl Error {
    pub(crate) fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Project this error onto the observable taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::DeckNotFound(_) => ErrorKind::NotFound,
            Error::Corrupt { .. } | Error::Json(_) => ErrorKind::Corrupt,
            Error::Io(_) => ErrorKind::Io,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::AlreadyActive => ErrorKind::AlreadyActive,
            Error::NoSession => ErrorKind::NoSession,
            Error::Completed => ErrorKind::Completed,
            Error::WrongPhase { .. } => ErrorKind::WrongPhase,
            Error::InvalidGrade(_) => ErrorKind::InvalidGrade,
            Error::Toml(_) | Error::Config(_) => ErrorKind::Config,
        }
    }
}

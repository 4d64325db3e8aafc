//! Error types for pocketdb

use std::fmt;
use std::io;

use crate::document::DocId;

/// Result type alias for pocketdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error raised by a caller-supplied predicate
pub type PredicateError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for database operations
#[derive(Debug)]
pub enum Error {
    /// The API was called with an invalid combination of arguments
    Usage(String),

    /// A document with this ID already exists in the table
    DuplicateId(DocId),

    /// I/O error from a storage backend
    Io(io::Error),

    /// Persisted data is present but could not be decoded
    Decode(serde_json::Error),

    /// Storage has been closed
    Closed,

    /// Storage was opened read-only
    ReadOnly,

    /// A document operation targeted a field that does not exist
    FieldNotFound(String),

    /// An arithmetic operation targeted a non-numeric value
    NotNumeric(String),

    /// A caller-supplied test function failed
    Predicate(PredicateError),
}

impl Error {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// True for errors caused by calling the API incorrectly
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Usage(msg) => write!(f, "Usage error: {}", msg),
            Error::DuplicateId(id) => write!(f, "Document with ID {} already exists", id),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Closed => write!(f, "Storage is closed"),
            Error::ReadOnly => write!(f, "Storage is read-only"),
            Error::FieldNotFound(field) => write!(f, "Field not found: {}", field),
            Error::NotNumeric(field) => write!(f, "Field is not numeric: {}", field),
            Error::Predicate(e) => write!(f, "Predicate failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Decode(e) => Some(e),
            Error::Predicate(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Usage(format!("invalid regex: {}", err))
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        Error::Usage(format!("invalid field path: {:?}", err))
    }
}

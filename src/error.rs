//! Error types for the namespace index

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Namespace operation error
    #[error("Namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    /// Backing store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Metric name rejected
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    /// Datapoint fetch or write error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

/// Metric name validation errors
///
/// Raised when a leaf name is first created. Ancestors derived from a
/// valid leaf are never re-validated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// Name was empty
    #[error("metric name must be non-empty")]
    Empty,

    /// Name contained an empty dot-segment (e.g. `a..b`)
    #[error("metric name must not contain an empty segment, got '{0}'")]
    EmptySegment(String),

    /// Name started with a dot
    #[error("metric name must not have a leading dot, got '{0}'")]
    LeadingDot(String),

    /// Name had fewer segments than the configured minimum
    #[error("metric name must have at least {min} dot-separated segments, got '{name}'")]
    TooFewSegments {
        /// The rejected name
        name: String,
        /// Minimum required segment count
        min: usize,
    },

    /// Name contained a space
    #[error("metric name must not contain embedded spaces, got '{0}'")]
    EmbeddedSpace(String),

    /// Name contained characters outside `[A-Za-z0-9_\-.:]`
    #[error("metric name contains invalid characters {chars:?}, got '{name}'")]
    InvalidCharacters {
        /// The rejected name
        name: String,
        /// Offending characters in order of appearance
        chars: Vec<char>,
    },
}

/// Backing store errors
///
/// Messages never contain credentials; Redis URLs are sanitized before
/// they are embedded.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Connection to the store failed or was lost
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A store command failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// A record could not be decoded
    #[error("Corrupted record for '{name}': {reason}")]
    CorruptedRecord {
        /// Metric name of the record
        name: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Namespace mutation errors
#[derive(Error, Debug)]
pub enum NamespaceError {
    /// Name failed validation, no node created
    #[error("Invalid metric name: {0}")]
    InvalidName(#[from] NamingError),

    /// Link creation was asked to point at a node that does not exist
    #[error("Link target does not exist: {0}")]
    LinkTargetMissing(String),

    /// Node vanished between write and read-back
    #[error("Node not found after write: {0}")]
    NodeVanished(String),

    /// The backing store was unavailable
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Errors talking to the datapoint backend (KairosDB)
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport failure or timeout
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend answered with a non-success status
    #[error("Unexpected status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Backend reported query errors
    #[error("Backend errors: {0:?}")]
    Backend(Vec<String>),

    /// Response did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

//! Remote lookup failures

use thiserror::Error;

/// Result type for lookup operations
pub type LookupResult<T> = Result<T, LookupError>;

/// A remote lookup failed; the caller decides the user-facing text
#[derive(Debug, Error)]
pub enum LookupError {
    /// Connection, timeout or other transport failure
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The body was not the expected JSON array
    #[error("malformed payload from {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Scripted failure from an in-memory lookup
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

use thiserror::Error;

/// Result type alias using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the widget orchestration layer.
///
/// Transport variants carry the categorization the controller needs to decide
/// whether the backend is still considered online: a `RateLimited` response
/// leaves the service online, while `Timeout`, `NetworkUnavailable` and
/// `ServiceUnavailable` flip it offline.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed entity field, rejected at construction time.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session message list is at capacity.
    #[error("Session cannot exceed {0} messages")]
    SessionFull(usize),

    /// The request was aborted after the configured timeout.
    #[error("Request timed out after {0}ms. Please try again.")]
    Timeout(u64),

    /// The backend could not be reached at all.
    #[error("Unable to connect to the backend service. Please check your connection and try again.")]
    NetworkUnavailable,

    /// HTTP 429: the service is up but refusing further queries for now.
    #[error("Rate limit exceeded. Please wait before sending another query.")]
    RateLimited,

    /// HTTP 503: the service reports itself unavailable.
    #[error("The AI service is temporarily unavailable. Please try again later.")]
    ServiceUnavailable,

    /// Local snapshot storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Snapshot or payload (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while preparing local storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure: non-2xx status or malformed body.
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Whether this error marks the backend as unreachable.
    pub fn takes_service_offline(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::NetworkUnavailable | Error::ServiceUnavailable
        )
    }
}

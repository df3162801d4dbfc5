use crate::http::TransportError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No response reached the client (network failure, timeout).
    #[error("{message}")]
    Transport {
        message: String,
        #[source]
        source: TransportError,
    },
    /// The backend answered with an error status or an embedded error code.
    #[error("{message}")]
    Api { code: i64, message: String },
    /// The backend rejected the session (401).
    #[error("Invalid session, or the session has expired. Please log in again.")]
    SessionExpired,
    /// Identical mutating request issued inside the debounce window.
    #[error("Data is being processed, please do not submit again")]
    DuplicateSubmission { url: String },
    #[error("Login failed: token not found in response")]
    MalformedAuthResponse,
    #[error("No session")]
    NoSession,
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),
    #[error("Payload encryption error: {0}")]
    Crypto(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

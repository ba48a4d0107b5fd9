use thiserror::Error;

/// Errors produced when talking to the server.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure: DNS, connect, TLS, timeout.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered outside the 2xx range.
    #[error("Server returned HTTP {0}")]
    Status(u16),

    /// The server answered 2xx but rejected the request
    /// (`success: false` in the envelope).
    #[error("API error: {0}")]
    Api(String),

    /// The response body was not the expected JSON shape.
    #[error("Malformed API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No valid session.  Callers stop polling and prompt for login
    /// instead of retrying.
    #[error("Session expired or not authenticated")]
    AuthRequired,
}

impl ApiError {
    /// Whether the failure means the session is gone rather than the
    /// request being transiently unlucky.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::AuthRequired)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;

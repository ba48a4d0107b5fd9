use thiserror::Error;

use quickchat_api::ApiError;
use quickchat_shared::ValidationError;

/// Errors surfaced by client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The operation needs a session and none is established.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The input was rejected before any network traffic.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The server or the transport failed the operation.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A thread panicked while holding the shared state lock.
    #[error("Shared state lock poisoned")]
    StatePoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

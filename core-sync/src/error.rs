use bridge_traits::error::BridgeError;
use bridge_traits::scrobble::ServiceError;
use core_library::LibraryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Last.fm error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited by remote service")]
    RateLimited,

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl SyncError {
    /// Whether a later retry of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_)
                | SyncError::Timeout(_)
                | SyncError::RateLimited
                | SyncError::Http { status: 500..=599, .. }
        )
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(after) => SyncError::Timeout(after),
            other => SyncError::Transport(other.to_string()),
        }
    }
}

impl From<ServiceError> for SyncError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Transport(msg) => SyncError::Transport(msg),
            ServiceError::Auth(msg) => SyncError::Auth(msg),
            ServiceError::RateLimited => SyncError::RateLimited,
            ServiceError::Remote { code, message } => SyncError::Remote { code, message },
            ServiceError::Protocol(msg) => SyncError::Protocol(msg),
        }
    }
}

impl From<SyncError> for ServiceError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Remote { code, message } => ServiceError::Remote { code, message },
            SyncError::Auth(msg) => ServiceError::Auth(msg),
            SyncError::RateLimited => ServiceError::RateLimited,
            SyncError::Protocol(msg) => ServiceError::Protocol(msg),
            other => ServiceError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

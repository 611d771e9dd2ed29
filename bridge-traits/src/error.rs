use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Bridge operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response from {source_name}: {message}")]
    Malformed {
        source_name: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure means the capability itself is missing rather than
    /// a single call going wrong.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BridgeError::NotAvailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

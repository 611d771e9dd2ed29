//! # Monitor Error Types

use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use core_sync::SyncError;
use thiserror::Error;

/// Errors surfaced by the playback monitor and its engine.
///
/// Inside a poll tick every one of these is logged and swallowed; only
/// [`MonitorError::GaugeSeed`] aborts engine startup.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Reading the initial play total failed.
    #[error("Failed to seed submitted-count gauge: {0}")]
    GaugeSeed(#[source] LibraryError),

    /// Player-state provider failed or timed out.
    #[error("Player provider error: {0}")]
    Provider(#[from] BridgeError),

    /// The coordinator task is gone.
    #[error("Playback coordinator is not running")]
    CoordinatorClosed,

    #[error("Invalid monitor configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

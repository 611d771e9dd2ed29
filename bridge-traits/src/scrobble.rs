//! Scrobble Service Capability
//!
//! The remote listening-history service. The core only needs two calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fields sent with both now-playing updates and scrobbles.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrobbleRequest {
    pub artist: String,
    pub album_artist: String,
    pub track: String,
    pub album: String,
    pub duration_secs: u32,
    /// Unix time the listen started. Ignored by now-playing updates.
    pub timestamp: i64,
    pub track_number: Option<u32>,
    pub musicbrainz_id: Option<String>,
}

/// Service acknowledgment for a scrobble submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrobbleAck {
    pub accepted: u32,
    pub ignored: u32,
}

/// Failure reported by a scrobble service implementation.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by remote service")]
    RateLimited,

    #[error("remote service error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Scrobble service trait
#[async_trait]
pub trait ScrobbleService: Send + Sync {
    /// Tell the service what is playing now. Not recorded in history.
    async fn update_now_playing(&self, request: &ScrobbleRequest) -> ServiceResult<()>;

    /// Submit a completed listen.
    async fn submit_scrobble(&self, request: &ScrobbleRequest) -> ServiceResult<ScrobbleAck>;
}

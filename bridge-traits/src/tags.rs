//! Tag Extraction Capabilities
//!
//! Two backends: a generic extractor returning an encoder-dependent key/value
//! map, and a fixed-schema reader for WAV files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Raw tag map as produced by a generic extractor. Key spelling varies by
/// encoder (`Artist` vs `artist`).
pub type TagMap = serde_json::Map<String, serde_json::Value>;

/// Generic tag extractor
#[async_trait]
pub trait TagExtractor: Send + Sync {
    /// Extract every tag the backend knows about for `path`.
    async fn extract(&self, path: &Path) -> Result<TagMap>;
}

/// Fields read from a WAV file's RIFF INFO chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WaveInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Raw track field, which may be `"3"`, `"3/12"` and so on.
    pub track_number: Option<String>,
}

/// Fixed-schema WAV reader
#[async_trait]
pub trait WaveInfoReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<WaveInfo>;
}

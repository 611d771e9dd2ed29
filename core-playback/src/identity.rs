//! Per-tick playback snapshots and the identity used to tell tracks apart.

use bridge_traits::notify::TrackSummary;
use bridge_traits::player::{NowPlaying, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What makes two observations "the same track".
///
/// Container files can hold several tracks under one path, so the title is
/// part of the key. Sources without a URL compare on title alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackIdentity {
    pub url: String,
    pub title: String,
}

impl TrackIdentity {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// One observation of a playing source, replaced every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub source: SourceId,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: f64,
    pub position_secs: f64,
    pub url: String,
    pub observed_at: DateTime<Utc>,
}

impl PlaybackSnapshot {
    pub fn new(source: SourceId, now_playing: NowPlaying, observed_at: DateTime<Utc>) -> Self {
        Self {
            source,
            title: now_playing.title,
            artist: now_playing.artist,
            album: now_playing.album,
            duration_secs: now_playing.duration_secs,
            position_secs: now_playing.position_secs,
            url: now_playing.url,
            observed_at,
        }
    }

    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::new(&self.url, &self.title)
    }

    /// `position / duration`, or `None` when the duration is zero or unknown.
    pub fn progress_ratio(&self) -> Option<f64> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return None;
        }
        if !self.position_secs.is_finite() {
            return None;
        }
        Some(self.position_secs.max(0.0) / self.duration_secs)
    }

    /// Unix time the listen began, inferred from the current position.
    pub fn started_at(&self) -> i64 {
        let elapsed = if self.position_secs.is_finite() {
            self.position_secs.max(0.0).floor() as i64
        } else {
            0
        };
        self.observed_at.timestamp() - elapsed
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            title: self.title.clone(),
            album: self.album.clone(),
            artist: self.artist.clone(),
        }
    }
}

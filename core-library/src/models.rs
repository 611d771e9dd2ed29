//! Domain models for the scrobble ledger
//!
//! Rows map one-to-one onto the `track_play_records` and `track_play_counts`
//! tables. Timestamps are Unix seconds.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// =============================================================================
// Scrobble records
// =============================================================================

/// A completed listen, durable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ScrobbleRecord {
    pub id: i64,
    pub artist: String,
    pub album_artist: String,
    pub track: String,
    pub album: String,
    pub duration_secs: i64,
    /// Unix time the listen started
    pub play_time: i64,
    /// Whether the remote service acknowledged this listen. Never reverts.
    #[sqlx(rename = "scrobbled")]
    pub sent: bool,
    pub musicbrainz_id: Option<String>,
    pub track_number: Option<i64>,
    /// Player source that produced the listen
    pub source: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert payload for [`ScrobbleRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewScrobbleRecord {
    pub artist: String,
    pub album_artist: String,
    pub track: String,
    pub album: String,
    pub duration_secs: i64,
    pub play_time: i64,
    pub sent: bool,
    pub musicbrainz_id: Option<String>,
    pub track_number: Option<i64>,
    pub source: String,
}

impl NewScrobbleRecord {
    /// Validate record data
    pub fn validate(&self) -> Result<(), String> {
        if self.track.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }

        if self.artist.trim().is_empty() {
            return Err("Artist cannot be empty".to_string());
        }

        if self.duration_secs < 0 {
            return Err("Duration cannot be negative".to_string());
        }

        if self.play_time <= 0 {
            return Err("Play time must be a positive Unix timestamp".to_string());
        }

        if self.source.trim().is_empty() {
            return Err("Source cannot be empty".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Aggregate play counts
// =============================================================================

/// Identity of an aggregate counter row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayCountKey {
    pub artist: String,
    pub album: String,
    pub track: String,
}

impl PlayCountKey {
    pub fn new(
        artist: impl Into<String>,
        album: impl Into<String>,
        track: impl Into<String>,
    ) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
            track: track.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.track.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }
        if self.artist.trim().is_empty() {
            return Err("Artist cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for PlayCountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.track, self.album)
    }
}

/// Per-track aggregate play count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TrackPlayCount {
    pub id: i64,
    pub artist: String,
    pub album: String,
    pub track: String,
    pub play_count: i64,
    /// Bumped on every update; conditional updates match on it
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TrackPlayCount {
    pub fn key(&self) -> PlayCountKey {
        PlayCountKey::new(&self.artist, &self.album, &self.track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NewScrobbleRecord {
        NewScrobbleRecord {
            artist: "Nick Drake".into(),
            track: "Pink Moon".into(),
            album: "Pink Moon".into(),
            duration_secs: 124,
            play_time: 1_700_000_000,
            source: "audirvana".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_validation() {
        assert!(record().validate().is_ok());

        let mut missing_title = record();
        missing_title.track = "  ".into();
        assert!(missing_title.validate().is_err());

        let mut zero_time = record();
        zero_time.play_time = 0;
        assert!(zero_time.validate().is_err());
    }

    #[test]
    fn test_key_validation_allows_empty_album() {
        assert!(PlayCountKey::new("Nick Drake", "", "Pink Moon")
            .validate()
            .is_ok());
        assert!(PlayCountKey::new("", "Pink Moon", "Pink Moon")
            .validate()
            .is_err());
    }
}

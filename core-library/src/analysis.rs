//! # Listening Analysis
//!
//! Read-only views composed from the play-count and scrobble-record
//! repositories.
//!
//! ## Overview
//!
//! - [`ListeningReport`]: number of tracked songs, the most played tracks and
//!   the latest listens.
//! - [`Recommendation`]: tracks ranked by play count, boosted by how often
//!   their artist and album show up in recent listens.
//!
//! A track's score is `play_count * artist_weight * album_weight`. A weight
//! is `1 + ln(n + 1)` where `n` is the number of recent listens sharing that
//! artist (or album), and `1` when there are none.
//!
//! ## Usage
//!
//! ```ignore
//! let analysis = ListeningAnalysis::new(counts, records);
//! let report = analysis.report().await?;
//! let picks = analysis.recommend(10).await?;
//! ```

use crate::error::Result;
use crate::models::{ScrobbleRecord, TrackPlayCount};
use crate::repositories::{PageRequest, PlayCountRepository, ScrobbleRecordRepository};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Most played tracks listed in a report
pub const REPORT_TOP_TRACKS: u32 = 10;

/// Latest listens listed in a report
pub const REPORT_RECENT_LISTENS: u32 = 20;

/// Recent listens used to weight recommendations
pub const RECOMMENDATION_WINDOW: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningReport {
    /// Distinct (artist, album, track) rows in the ledger
    pub total_tracks: u64,
    pub top_tracks: Vec<TrackPlayCount>,
    /// Newest first
    pub recent: Vec<ScrobbleRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub artist: String,
    pub album: String,
    pub track: String,
    pub score: f64,
}

impl Recommendation {
    fn scored(track: &TrackPlayCount, score: f64) -> Self {
        Self {
            artist: track.artist.clone(),
            album: track.album.clone(),
            track: track.track.clone(),
            score,
        }
    }
}

pub struct ListeningAnalysis {
    counts: Arc<dyn PlayCountRepository>,
    records: Arc<dyn ScrobbleRecordRepository>,
}

impl ListeningAnalysis {
    pub fn new(
        counts: Arc<dyn PlayCountRepository>,
        records: Arc<dyn ScrobbleRecordRepository>,
    ) -> Self {
        Self { counts, records }
    }

    #[instrument(skip(self))]
    pub async fn report(&self) -> Result<ListeningReport> {
        let top = self.counts.top(PageRequest::first(REPORT_TOP_TRACKS)).await?;
        let recent = self
            .records
            .query(PageRequest::first(REPORT_RECENT_LISTENS))
            .await?;

        debug!(total_tracks = top.total, "Listening report built");
        Ok(ListeningReport {
            total_tracks: top.total,
            top_tracks: top.items,
            recent: recent.items,
        })
    }

    /// Best `limit` tracks across the whole ledger.
    #[instrument(skip(self))]
    pub async fn recommend(&self, limit: usize) -> Result<Vec<Recommendation>> {
        let tracks = self.counts.all().await?;
        let recent = self
            .records
            .query(PageRequest::first(RECOMMENDATION_WINDOW))
            .await?;

        Ok(score_tracks(&tracks, &recent.items, limit))
    }

    /// Best `limit` tracks by one artist, ranked by play count alone.
    #[instrument(skip(self))]
    pub async fn recommend_for_artist(
        &self,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let mut picks: Vec<_> = self
            .counts
            .by_artist(artist)
            .await?
            .iter()
            .map(|track| Recommendation::scored(track, track.play_count as f64))
            .collect();

        rank(&mut picks, limit);
        Ok(picks)
    }
}

/// Score `tracks` against `recent` listens and keep the best `limit`.
///
/// Ties keep the order of `tracks`.
pub fn score_tracks(
    tracks: &[TrackPlayCount],
    recent: &[ScrobbleRecord],
    limit: usize,
) -> Vec<Recommendation> {
    let mut artists: HashMap<&str, u32> = HashMap::new();
    let mut albums: HashMap<&str, u32> = HashMap::new();
    for record in recent {
        *artists.entry(record.artist.as_str()).or_default() += 1;
        *albums.entry(record.album.as_str()).or_default() += 1;
    }

    let mut picks: Vec<_> = tracks
        .iter()
        .map(|track| {
            let score = track.play_count as f64
                * weight(artists.get(track.artist.as_str()).copied())
                * weight(albums.get(track.album.as_str()).copied());
            Recommendation::scored(track, score)
        })
        .collect();

    rank(&mut picks, limit);
    picks
}

fn weight(frequency: Option<u32>) -> f64 {
    frequency.map_or(1.0, |n| 1.0 + (f64::from(n) + 1.0).ln())
}

fn rank(picks: &mut Vec<Recommendation>, limit: usize) {
    picks.sort_by(|a, b| b.score.total_cmp(&a.score));
    picks.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{NewScrobbleRecord, PlayCountKey};
    use crate::repositories::{SqlitePlayCountRepository, SqliteScrobbleRecordRepository};

    fn count(artist: &str, album: &str, track: &str, play_count: i64) -> TrackPlayCount {
        TrackPlayCount {
            id: 0,
            artist: artist.to_string(),
            album: album.to_string(),
            track: track.to_string(),
            play_count,
            version: play_count,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn listen(artist: &str, album: &str, track: &str, play_time: i64) -> NewScrobbleRecord {
        NewScrobbleRecord {
            artist: artist.to_string(),
            album_artist: artist.to_string(),
            track: track.to_string(),
            album: album.to_string(),
            duration_secs: 300,
            play_time,
            sent: true,
            musicbrainz_id: None,
            track_number: None,
            source: "roon".to_string(),
        }
    }

    fn recorded(artist: &str, album: &str) -> ScrobbleRecord {
        ScrobbleRecord {
            id: 0,
            artist: artist.to_string(),
            album_artist: artist.to_string(),
            track: "any".to_string(),
            album: album.to_string(),
            duration_secs: 300,
            play_time: 0,
            sent: true,
            musicbrainz_id: None,
            track_number: None,
            source: "roon".to_string(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_recent_artist_and_album_boost_score() {
        let tracks = vec![
            count("Talk Talk", "Spirit of Eden", "Eden", 2),
            count("Slint", "Spiderland", "Nosferatu Man", 3),
            count("Talk Talk", "Laughing Stock", "New Grass", 1),
        ];
        let recent = vec![
            recorded("Talk Talk", "Spirit of Eden"),
            recorded("Talk Talk", "Spirit of Eden"),
            recorded("Talk Talk", "Spirit of Eden"),
        ];

        let picks = score_tracks(&tracks, &recent, 10);
        let order: Vec<_> = picks.iter().map(|p| p.track.as_str()).collect();
        assert_eq!(order, vec!["Eden", "Nosferatu Man", "New Grass"]);

        let boost = 1.0 + 4f64.ln();
        assert!((picks[0].score - 2.0 * boost * boost).abs() < 1e-9);
        assert!((picks[1].score - 3.0).abs() < 1e-9);
        assert!((picks[2].score - boost).abs() < 1e-9);
    }

    #[test]
    fn test_without_recent_listens_score_is_play_count() {
        let tracks = vec![
            count("Slint", "Spiderland", "Washer", 4),
            count("Slint", "Spiderland", "Good Morning, Captain", 4),
            count("Slint", "Tweez", "Ron", 7),
        ];

        let picks = score_tracks(&tracks, &[], 2);
        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0].track, "Ron");
        assert_eq!(picks[0].score, 7.0);
        assert_eq!(picks[1].track, "Washer");
    }

    #[test]
    fn test_empty_ledger_recommends_nothing() {
        assert!(score_tracks(&[], &[recorded("Slint", "Tweez")], 5).is_empty());
    }

    async fn ledger() -> (
        ListeningAnalysis,
        Arc<SqlitePlayCountRepository>,
        Arc<SqliteScrobbleRecordRepository>,
    ) {
        let pool = create_test_pool().await.unwrap();
        let counts = Arc::new(SqlitePlayCountRepository::new(pool.clone()));
        let records = Arc::new(SqliteScrobbleRecordRepository::new(pool));
        (
            ListeningAnalysis::new(counts.clone(), records.clone()),
            counts,
            records,
        )
    }

    #[tokio::test]
    async fn test_report_limits_and_orders() {
        let (analysis, counts, records) = ledger().await;

        for n in 1..=12 {
            let key = PlayCountKey::new("Low", "Things We Lost in the Fire", format!("Song {n}"));
            for _ in 0..n {
                counts.increment(&key).await.unwrap();
            }
        }
        for n in 0..25 {
            let title = format!("Listen {n}");
            records
                .insert(&listen("Low", "Things We Lost in the Fire", &title, 1_700_000_000 + n))
                .await
                .unwrap();
        }

        let report = analysis.report().await.unwrap();
        assert_eq!(report.total_tracks, 12);
        assert_eq!(report.top_tracks.len(), REPORT_TOP_TRACKS as usize);
        assert_eq!(report.top_tracks[0].track, "Song 12");
        assert_eq!(report.top_tracks[9].track, "Song 3");
        assert_eq!(report.recent.len(), REPORT_RECENT_LISTENS as usize);
        assert_eq!(report.recent[0].track, "Listen 24");
    }

    #[tokio::test]
    async fn test_recommend_from_ledger() {
        let (analysis, counts, records) = ledger().await;

        let eden = PlayCountKey::new("Talk Talk", "Spirit of Eden", "Eden");
        let washer = PlayCountKey::new("Slint", "Spiderland", "Washer");
        counts.increment(&eden).await.unwrap();
        for _ in 0..2 {
            counts.increment(&washer).await.unwrap();
        }
        for n in 0..3 {
            records
                .insert(&listen("Talk Talk", "Spirit of Eden", "Eden", 1_700_000_000 + n))
                .await
                .unwrap();
        }

        let picks = analysis.recommend(10).await.unwrap();
        assert_eq!(picks[0].track, "Eden");
        assert_eq!(picks[1].track, "Washer");

        let slint = analysis.recommend_for_artist("Slint", 10).await.unwrap();
        assert_eq!(slint.len(), 1);
        assert_eq!(slint[0].score, 2.0);
    }
}

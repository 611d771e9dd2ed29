//! Aggregate play-count repository
//!
//! Counts are updated with optimistic concurrency: read the row, then write
//! `play_count + 1, version + 1` only if `version` is still what was read.
//! A lost race (zero rows updated, or a unique-key collision on first insert)
//! is retried with jittered exponential backoff up to
//! [`ConflictRetryPolicy::max_attempts`].

use crate::error::{LibraryError, Result};
use crate::models::{PlayCountKey, TrackPlayCount};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use rand::Rng;
use sqlx::{query_as, SqlitePool};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Aggregate counter store
#[async_trait]
pub trait PlayCountRepository: Send + Sync {
    /// Add one play to `key`, creating the row on first play
    ///
    /// # Errors
    /// Returns [`LibraryError::ConcurrencyConflict`] if every attempt lost a
    /// race, or a database error.
    async fn increment(&self, key: &PlayCountKey) -> Result<TrackPlayCount>;

    /// Current row for `key`, if it was ever played
    async fn get(&self, key: &PlayCountKey) -> Result<Option<TrackPlayCount>>;

    /// Rows ordered by descending play count
    async fn top(&self, page_request: PageRequest) -> Result<Page<TrackPlayCount>>;

    /// Every row, most played first
    async fn all(&self) -> Result<Vec<TrackPlayCount>>;

    /// Rows for one artist, most played first
    async fn by_artist(&self, artist: &str) -> Result<Vec<TrackPlayCount>>;

    /// Sum of all play counts
    ///
    /// This counts plays, not distinct tracks; use `top(..).total` for the
    /// number of tracked rows.
    async fn total_plays(&self) -> Result<i64>;
}

/// Retry bound for optimistic updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ConflictRetryPolicy {
    /// Full-jitter backoff for the given 1-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        let ceiling = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let ceiling_micros = ceiling.as_micros().min(u128::from(u64::MAX)) as u64;
        if ceiling_micros == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::thread_rng().gen_range(0..=ceiling_micros))
    }
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 32,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(250),
        }
    }
}

/// Outcome of a single optimistic attempt
#[derive(Debug)]
enum Attempt {
    Committed(TrackPlayCount),
    Conflict,
}

/// SQLite implementation of PlayCountRepository
pub struct SqlitePlayCountRepository {
    pool: SqlitePool,
    retry: ConflictRetryPolicy,
}

impl SqlitePlayCountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_retry_policy(pool, ConflictRetryPolicy::default())
    }

    pub fn with_retry_policy(pool: SqlitePool, retry: ConflictRetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn try_increment(&self, key: &PlayCountKey) -> Result<Attempt> {
        let now = chrono::Utc::now().timestamp();

        match self.get(key).await? {
            None => {
                let inserted = query_as::<_, TrackPlayCount>(
                    r#"
                    INSERT INTO track_play_counts
                        (artist, album, track, play_count, version, created_at, updated_at)
                    VALUES (?, ?, ?, 1, 1, ?, ?)
                    RETURNING *
                    "#,
                )
                .bind(&key.artist)
                .bind(&key.album)
                .bind(&key.track)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool)
                .await
                .map_err(LibraryError::from);

                match inserted {
                    Ok(row) => Ok(Attempt::Committed(row)),
                    Err(e) if e.is_unique_violation() => Ok(Attempt::Conflict),
                    Err(e) => Err(e),
                }
            }
            Some(current) => {
                let updated = self
                    .conditional_update(current.id, current.version, now)
                    .await?;
                Ok(match updated {
                    Some(row) => Attempt::Committed(row),
                    None => Attempt::Conflict,
                })
            }
        }
    }

    /// Bump the row only if it is still at `expected_version`.
    ///
    /// Returns `None` when another writer got there first.
    async fn conditional_update(
        &self,
        id: i64,
        expected_version: i64,
        now: i64,
    ) -> Result<Option<TrackPlayCount>> {
        let row = query_as::<_, TrackPlayCount>(
            r#"
            UPDATE track_play_counts
            SET play_count = play_count + 1, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl PlayCountRepository for SqlitePlayCountRepository {
    #[instrument(skip(self), fields(key = %key))]
    async fn increment(&self, key: &PlayCountKey) -> Result<TrackPlayCount> {
        key.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "play_count_key".to_string(),
            message: msg,
        })?;

        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.try_increment(key).await? {
                Attempt::Committed(row) => {
                    debug!(attempt, play_count = row.play_count, "Play count committed");
                    return Ok(row);
                }
                Attempt::Conflict => {
                    debug!(attempt, "Play count update lost a race, retrying");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        warn!(attempts = max_attempts, "Play count update kept conflicting");
        Err(LibraryError::ConcurrencyConflict {
            attempts: max_attempts,
        })
    }

    async fn get(&self, key: &PlayCountKey) -> Result<Option<TrackPlayCount>> {
        let row = query_as::<_, TrackPlayCount>(
            "SELECT * FROM track_play_counts WHERE artist = ? AND album = ? AND track = ?",
        )
        .bind(&key.artist)
        .bind(&key.album)
        .bind(&key.track)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn top(&self, page_request: PageRequest) -> Result<Page<TrackPlayCount>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM track_play_counts")
            .fetch_one(&self.pool)
            .await?;

        let rows = query_as::<_, TrackPlayCount>(
            "SELECT * FROM track_play_counts ORDER BY play_count DESC, updated_at DESC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit)
        .bind(page_request.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(rows, total as u64, page_request))
    }

    async fn all(&self) -> Result<Vec<TrackPlayCount>> {
        let rows = query_as::<_, TrackPlayCount>(
            "SELECT * FROM track_play_counts ORDER BY play_count DESC, updated_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn by_artist(&self, artist: &str) -> Result<Vec<TrackPlayCount>> {
        let rows = query_as::<_, TrackPlayCount>(
            "SELECT * FROM track_play_counts WHERE artist = ? ORDER BY play_count DESC, updated_at DESC, id ASC",
        )
        .bind(artist)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn total_plays(&self) -> Result<i64> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(play_count), 0) FROM track_play_counts")
                .fetch_one(&self.pool)
                .await?;

        Ok(total)
    }
}

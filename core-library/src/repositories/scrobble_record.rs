//! Scrobble record repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{NewScrobbleRecord, ScrobbleRecord};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};
use tracing::debug;

/// Durable ledger of completed listens
#[async_trait]
pub trait ScrobbleRecordRepository: Send + Sync {
    /// Insert a record and return its id
    ///
    /// # Errors
    /// Returns error if validation fails or the database rejects the row.
    async fn insert(&self, record: &NewScrobbleRecord) -> Result<i64>;

    /// Find a record by id
    async fn find_by_id(&self, id: i64) -> Result<Option<ScrobbleRecord>>;

    /// Unsent records, oldest play first, at most `limit`
    async fn list_unsent(&self, limit: u32) -> Result<Vec<ScrobbleRecord>>;

    /// Flag a record as acknowledged by the remote service
    ///
    /// `sent` only ever goes from false to true.
    ///
    /// # Returns
    /// - `Ok(true)` if the record was unsent and is now sent
    /// - `Ok(false)` if it was already sent or no record has that id
    async fn mark_sent(&self, id: i64) -> Result<bool>;

    /// Number of records still waiting for submission
    async fn count_unsent(&self) -> Result<i64>;

    /// Listening history, newest first
    async fn query(&self, page_request: PageRequest) -> Result<Page<ScrobbleRecord>>;
}

/// SQLite implementation of ScrobbleRecordRepository
pub struct SqliteScrobbleRecordRepository {
    pool: SqlitePool,
}

impl SqliteScrobbleRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScrobbleRecordRepository for SqliteScrobbleRecordRepository {
    async fn insert(&self, record: &NewScrobbleRecord) -> Result<i64> {
        record
            .validate()
            .map_err(|msg| LibraryError::InvalidInput {
                field: "scrobble_record".to_string(),
                message: msg,
            })?;

        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO track_play_records (
                artist, album_artist, track, album, duration_secs,
                play_time, scrobbled, musicbrainz_id, track_number, source,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.artist)
        .bind(&record.album_artist)
        .bind(&record.track)
        .bind(&record.album)
        .bind(record.duration_secs)
        .bind(record.play_time)
        .bind(record.sent)
        .bind(&record.musicbrainz_id)
        .bind(record.track_number)
        .bind(&record.source)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, track = %record.track, sent = record.sent, "Inserted scrobble record");
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ScrobbleRecord>> {
        let record =
            query_as::<_, ScrobbleRecord>("SELECT * FROM track_play_records WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    async fn list_unsent(&self, limit: u32) -> Result<Vec<ScrobbleRecord>> {
        let records = query_as::<_, ScrobbleRecord>(
            "SELECT * FROM track_play_records WHERE scrobbled = 0 ORDER BY play_time ASC, id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn mark_sent(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE track_play_records SET scrobbled = 1, updated_at = ? WHERE id = ? AND scrobbled = 0",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_unsent(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM track_play_records WHERE scrobbled = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<ScrobbleRecord>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM track_play_records")
            .fetch_one(&self.pool)
            .await?;

        let records = query_as::<_, ScrobbleRecord>(
            "SELECT * FROM track_play_records ORDER BY play_time DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit)
        .bind(page_request.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(records, total as u64, page_request))
    }
}

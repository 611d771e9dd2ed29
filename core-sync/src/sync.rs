//! # Scrobble Sync
//!
//! Delivers listens to the remote service and keeps the local ledger honest
//! about what was delivered.
//!
//! ## Overview
//!
//! - [`ScrobbleSync::update_now_playing`] forwards a transient status update.
//! - [`ScrobbleSync::submit_scrobble`] submits a completed listen and always
//!   persists it, with `sent` reflecting whether the service acknowledged it.
//! - [`ScrobbleSync::catch_up`] resubmits unsent records oldest first,
//!   pausing between submissions, marking each sent only on acknowledgment.
//!
//! Remote calls are bounded by an optional timeout so a hung request cannot
//! stall the caller's loop indefinitely.

use crate::error::{Result, SyncError};
use bridge_traits::player::SourceId;
use bridge_traits::scrobble::{ScrobbleAck, ScrobbleRequest, ScrobbleService};
use core_library::models::{NewScrobbleRecord, ScrobbleRecord};
use core_library::repositories::ScrobbleRecordRepository;
use core_runtime::config::{MonitorSettings, ReconcileSettings};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Tunables for [`ScrobbleSync`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Bound on each remote call; `None` waits indefinitely
    pub call_timeout: Option<Duration>,
    /// Default batch size for [`ScrobbleSync::catch_up`]
    pub batch_limit: u32,
    /// Pause between consecutive catch-up submissions
    pub submission_delay: Duration,
    /// Abort a catch-up pass at the first failure
    pub stop_on_failure: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&MonitorSettings::default(), &ReconcileSettings::default())
    }
}

impl SyncSettings {
    pub fn from_config(monitor: &MonitorSettings, reconcile: &ReconcileSettings) -> Self {
        Self {
            call_timeout: monitor.call_timeout,
            batch_limit: reconcile.batch_limit,
            submission_delay: reconcile.submission_delay,
            stop_on_failure: reconcile.stop_on_failure,
        }
    }
}

/// Result of a live scrobble submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleOutcome {
    /// Row id of the persisted record
    pub record_id: i64,
    /// Whether the service acknowledged the submission
    pub sent: bool,
    pub ack: Option<ScrobbleAck>,
}

/// Summary of a catch-up pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    /// Records examined in this pass
    pub attempted: usize,
    /// Records acknowledged and marked sent
    pub submitted: usize,
    /// Records that stay unsent after this pass
    pub failed: usize,
    /// Unsent records left in the ledger afterwards, including ones beyond the limit
    pub remaining: i64,
}

impl CatchUpReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Remote delivery plus durable ledger of listens
pub struct ScrobbleSync {
    service: Arc<dyn ScrobbleService>,
    records: Arc<dyn ScrobbleRecordRepository>,
    settings: SyncSettings,
}

impl ScrobbleSync {
    pub fn new(
        service: Arc<dyn ScrobbleService>,
        records: Arc<dyn ScrobbleRecordRepository>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            service,
            records,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = bridge_traits::scrobble::ServiceResult<T>>,
    {
        match self.settings.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(SyncError::from),
                Err(_) => Err(SyncError::Timeout(limit)),
            },
            None => call.await.map_err(SyncError::from),
        }
    }

    /// Tell the service what is playing. Failures are returned, not retried.
    #[instrument(skip(self, request), fields(track = %request.track))]
    pub async fn update_now_playing(&self, request: &ScrobbleRequest) -> Result<()> {
        self.bounded(self.service.update_now_playing(request)).await?;
        debug!("Now playing updated");
        Ok(())
    }

    /// Submit a completed listen and persist it.
    ///
    /// A remote failure is not an error here: the record is stored with
    /// `sent = false` and becomes eligible for [`catch_up`](Self::catch_up).
    /// Only a persistence failure is returned as `Err`.
    #[instrument(skip(self, request), fields(track = %request.track, source = %source))]
    pub async fn submit_scrobble(
        &self,
        request: &ScrobbleRequest,
        source: &SourceId,
    ) -> Result<ScrobbleOutcome> {
        let ack = match self.bounded(self.service.submit_scrobble(request)).await {
            Ok(ack) => {
                info!(accepted = ack.accepted, ignored = ack.ignored, "Scrobble submitted");
                Some(ack)
            }
            Err(e) => {
                warn!(error = %e, "Scrobble submission failed, keeping it for catch-up");
                None
            }
        };

        let record = new_record(request, source, ack.is_some());
        let record_id = self.records.insert(&record).await?;

        Ok(ScrobbleOutcome {
            record_id,
            sent: ack.is_some(),
            ack,
        })
    }

    /// Resubmit up to `limit` unsent records, oldest first.
    ///
    /// `None` uses the configured batch limit.
    #[instrument(skip(self))]
    pub async fn catch_up(&self, limit: Option<u32>) -> Result<CatchUpReport> {
        let limit = limit.unwrap_or(self.settings.batch_limit);
        let pending = self.records.list_unsent(limit).await?;
        let mut report = CatchUpReport::default();

        if pending.is_empty() {
            debug!("Nothing to catch up");
            return Ok(report);
        }

        info!(count = pending.len(), "Catching up unsent scrobbles");

        for (index, record) in pending.iter().enumerate() {
            if index > 0 && !self.settings.submission_delay.is_zero() {
                tokio::time::sleep(self.settings.submission_delay).await;
            }

            report.attempted += 1;
            match self.resubmit(record).await {
                Ok(()) => report.submitted += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(record_id = record.id, error = %e, "Catch-up submission failed");
                    if self.settings.stop_on_failure {
                        break;
                    }
                }
            }
        }

        report.remaining = self.records.count_unsent().await?;
        info!(
            submitted = report.submitted,
            failed = report.failed,
            remaining = report.remaining,
            "Catch-up pass finished"
        );
        Ok(report)
    }

    async fn resubmit(&self, record: &ScrobbleRecord) -> Result<()> {
        let request = request_from_record(record);
        self.bounded(self.service.submit_scrobble(&request)).await?;

        if !self.records.mark_sent(record.id).await? {
            debug!(record_id = record.id, "Record was already sent or no longer exists");
        }
        Ok(())
    }
}

fn new_record(request: &ScrobbleRequest, source: &SourceId, sent: bool) -> NewScrobbleRecord {
    NewScrobbleRecord {
        artist: request.artist.clone(),
        album_artist: request.album_artist.clone(),
        track: request.track.clone(),
        album: request.album.clone(),
        duration_secs: i64::from(request.duration_secs),
        play_time: request.timestamp,
        sent,
        musicbrainz_id: request.musicbrainz_id.clone(),
        track_number: request.track_number.map(i64::from),
        source: source.as_str().to_string(),
    }
}

/// Rebuild the submission for a stored record.
pub fn request_from_record(record: &ScrobbleRecord) -> ScrobbleRequest {
    ScrobbleRequest {
        artist: record.artist.clone(),
        album_artist: record.album_artist.clone(),
        track: record.track.clone(),
        album: record.album.clone(),
        duration_secs: u32::try_from(record.duration_secs).unwrap_or(0),
        timestamp: record.play_time,
        track_number: record.track_number.and_then(|n| u32::try_from(n).ok()),
        musicbrainz_id: record.musicbrainz_id.clone(),
    }
}

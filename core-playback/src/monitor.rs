//! # Playback Monitor
//!
//! Per-source polling loop and the track/threshold state machine.
//!
//! ## Overview
//!
//! Each tick:
//!
//! 1. Poll the provider (bounded by the configured call timeout). A failure
//!    is logged and the monitor keeps its current state.
//! 2. Not running or not playing: give up the coordinator slot if held.
//! 3. Playing: claim the slot, then compare the track identity with the
//!    previous one. A new identity sends now-playing and clears the old
//!    identity's dedupe marker.
//! 4. Once `position / duration` passes the threshold and the identity has
//!    no marker, submit the scrobble, bump the play count and set the marker.
//!
//! Nothing that goes wrong inside a tick ends the loop.
//!
//! ## Usage
//!
//! ```ignore
//! let monitor = PlaybackMonitor::new("roon".into(), provider, context);
//! tokio::spawn(monitor.run(cancel.child_token()));
//! ```

use crate::coordinator::{CoordinatorHandle, ReleaseOutcome};
use crate::identity::{PlaybackSnapshot, TrackIdentity};
use crate::interval::AdaptiveInterval;
use bridge_traits::error::BridgeError;
use bridge_traits::player::{PlayerPoll, PlayerStateProvider, SourceId};
use bridge_traits::scrobble::ScrobbleRequest;
use bridge_traits::time::Clock;
use core_library::models::PlayCountKey;
use core_library::repositories::PlayCountRepository;
use core_metadata::{MetadataHandle, MetadataResolver, TagQuery};
use core_runtime::config::MonitorSettings;
use core_sync::ScrobbleSync;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Coarse source state derived from each poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Player application not running.
    Idle,
    /// Running, not playing.
    Stopped,
    Playing,
}

/// Collaborators shared by every source loop of one engine.
#[derive(Clone)]
pub struct MonitorContext {
    pub resolver: Arc<MetadataResolver>,
    pub sync: Arc<ScrobbleSync>,
    pub counts: Arc<dyn PlayCountRepository>,
    pub coordinator: CoordinatorHandle,
    pub clock: Arc<dyn Clock>,
    /// Completed listens since the start of the ledger
    pub submitted: Arc<AtomicU64>,
    pub settings: MonitorSettings,
}

/// What one tick did. Returned for callers and tests; the loop ignores it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The provider failed; state was left as it was.
    pub provider_failed: bool,
    /// A new track identity was observed.
    pub track_changed: bool,
    /// A scrobble was recorded this tick.
    pub scrobbled: bool,
    /// Set when this tick gave up the coordinator slot.
    pub released: Option<ReleaseOutcome>,
}

pub struct PlaybackMonitor {
    source: SourceId,
    provider: Arc<dyn PlayerStateProvider>,
    context: MonitorContext,
    state: MonitorState,
    previous: Option<TrackIdentity>,
    /// Unix time the current identity started playing
    started_at: i64,
    dedupe: HashSet<TrackIdentity>,
    holds_slot: bool,
    interval: AdaptiveInterval,
}

impl std::fmt::Debug for PlaybackMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackMonitor")
            .field("source", &self.source)
            .field("state", &self.state)
            .field("previous", &self.previous)
            .field("holds_slot", &self.holds_slot)
            .finish_non_exhaustive()
    }
}

impl PlaybackMonitor {
    pub fn new(
        source: SourceId,
        provider: Arc<dyn PlayerStateProvider>,
        context: MonitorContext,
    ) -> Self {
        let interval = AdaptiveInterval::from_settings(&context.settings);
        Self {
            source,
            provider,
            context,
            state: MonitorState::Idle,
            previous: None,
            started_at: 0,
            dedupe: HashSet::new(),
            holds_slot: false,
            interval,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn interval(&self) -> &AdaptiveInterval {
        &self.interval
    }

    /// Poll until `cancel` fires. Exits at the next tick boundary.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(source = %self.source, "Starting playback monitor");

        while !cancel.is_cancelled() {
            self.tick().await;

            let delay = self.interval.current();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if self.holds_slot {
            self.release_slot().await;
        }
        info!(source = %self.source, "Playback monitor stopped");
    }

    /// Run one poll cycle.
    #[instrument(skip(self), fields(source = %self.source))]
    pub async fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let poll = match self.poll().await {
            Ok(poll) => poll,
            Err(e) => {
                warn!(error = %e, "Player poll failed");
                outcome.provider_failed = true;
                self.interval
                    .record_tick(self.state == MonitorState::Playing, false);
                return outcome;
            }
        };

        let next_state = match poll {
            PlayerPoll::NotRunning => MonitorState::Idle,
            PlayerPoll::NotPlaying(_) => MonitorState::Stopped,
            PlayerPoll::Playing(now_playing) => {
                let snapshot =
                    PlaybackSnapshot::new(self.source.clone(), now_playing, self.context.clock.now());
                self.observe_playing(snapshot, &mut outcome).await;
                MonitorState::Playing
            }
        };

        if next_state != MonitorState::Playing && self.holds_slot {
            outcome.released = self.release_slot().await;
        }

        let changed = next_state != self.state || outcome.track_changed;
        if next_state != self.state {
            debug!(from = ?self.state, to = ?next_state, "Source state changed");
        }
        self.state = next_state;
        self.interval
            .record_tick(next_state == MonitorState::Playing, changed);
        outcome
    }

    async fn poll(&self) -> bridge_traits::error::Result<PlayerPoll> {
        match self.context.settings.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.poll())
                .await
                .map_err(|_| BridgeError::Timeout(limit))?,
            None => self.provider.poll().await,
        }
    }

    async fn release_slot(&mut self) -> Option<ReleaseOutcome> {
        self.holds_slot = false;
        match self.context.coordinator.release(self.source.clone()).await {
            Ok(released) => Some(released),
            Err(e) => {
                warn!(source = %self.source, error = %e, "Failed to release playback slot");
                None
            }
        }
    }

    async fn observe_playing(&mut self, snapshot: PlaybackSnapshot, outcome: &mut TickOutcome) {
        let identity = snapshot.identity();
        let new_track = self.previous.as_ref() != Some(&identity);

        match self
            .context
            .coordinator
            .mark_playing(self.source.clone(), snapshot.summary(), new_track)
            .await
        {
            Ok(_) => self.holds_slot = true,
            Err(e) => warn!(error = %e, "Failed to claim playback slot"),
        }

        if new_track {
            outcome.track_changed = true;
            self.on_track_changed(&snapshot, identity.clone()).await;
        }

        let Some(ratio) = snapshot.progress_ratio() else {
            return;
        };
        if ratio > self.context.settings.scrobble_threshold && !self.dedupe.contains(&identity) {
            self.scrobble(&snapshot).await;
            self.dedupe.insert(identity);
            outcome.scrobbled = true;
        }
    }

    async fn on_track_changed(&mut self, snapshot: &PlaybackSnapshot, identity: TrackIdentity) {
        info!(title = %snapshot.title, artist = %snapshot.artist, "Now playing");

        let handle = self.context.resolver.resolve(&snapshot.url).await;
        self.started_at = snapshot.started_at();
        let request = build_request(snapshot, handle.as_deref(), self.started_at);

        if let Err(e) = self.context.sync.update_now_playing(&request).await {
            warn!(error = %e, "Now-playing update failed");
        }

        if let Some(previous) = self.previous.take() {
            self.dedupe.remove(&previous);
        }
        self.previous = Some(identity);
    }

    async fn scrobble(&self, snapshot: &PlaybackSnapshot) {
        let handle = self.context.resolver.resolve(&snapshot.url).await;
        let request = build_request(snapshot, handle.as_deref(), self.started_at);

        match self.context.sync.submit_scrobble(&request, &self.source).await {
            Ok(submitted) => {
                info!(
                    record_id = submitted.record_id,
                    sent = submitted.sent,
                    track = %request.track,
                    "Listen recorded"
                );
            }
            Err(e) => error!(error = %e, track = %request.track, "Failed to persist listen"),
        }

        let key = PlayCountKey::new(&request.artist, &request.album, &request.track);
        match self.context.counts.increment(&key).await {
            Ok(row) => debug!(play_count = row.play_count, "Play count updated"),
            Err(e) => error!(error = %e, key = %key, "Failed to update play count"),
        }

        let total = self.context.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(total, "Submitted-count gauge");
    }
}

/// Scrobble fields for `snapshot`, enriched from tags when available.
///
/// Tag artist and album artist win when non-empty; title and album always
/// come from the player.
pub fn build_request(
    snapshot: &PlaybackSnapshot,
    handle: Option<&MetadataHandle>,
    started_at: i64,
) -> ScrobbleRequest {
    let artist = handle
        .and_then(|h| h.artist())
        .unwrap_or(snapshot.artist.as_str())
        .to_string();
    let album_artist = handle
        .and_then(|h| h.album_artist())
        .map(str::to_string)
        .unwrap_or_else(|| artist.clone());
    let track_number = handle
        .map(|h| h.track_number())
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok());
    let duration_secs = if snapshot.duration_secs.is_finite() && snapshot.duration_secs > 0.0 {
        snapshot.duration_secs.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    };

    ScrobbleRequest {
        artist,
        album_artist,
        track: snapshot.title.clone(),
        album: snapshot.album.clone(),
        duration_secs,
        timestamp: started_at,
        track_number,
        musicbrainz_id: handle
            .and_then(|h| h.musicbrainz_track_id())
            .map(str::to_string),
    }
}

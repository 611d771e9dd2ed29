//! # Cross-Source Coordinator
//!
//! Single owner of the "currently playing" map shared by every source loop.
//!
//! ## Overview
//!
//! Monitors never touch the map directly. They send commands to one task
//! that applies them in arrival order, so removing a source and checking
//! whether any other source still plays happen in the same step.
//!
//! - A source that newly claims the slot, whose track info changes, or
//!   that reports a new track identity produces a `now_playing`
//!   notification.
//! - A source that releases the slot produces a `stop` notification only
//!   if no other source still holds it.
//!
//! ## Usage
//!
//! ```ignore
//! let (coordinator, task) = coordinator::spawn(event_bus.clone());
//! coordinator.mark_playing("roon".into(), summary, true).await?;
//! match coordinator.release("roon".into()).await? {
//!     ReleaseOutcome::Stopped => { /* stop was broadcast */ }
//!     _ => {}
//! }
//! ```

use crate::error::{MonitorError, Result};
use bridge_traits::notify::{NotificationSink, PlaybackNotification, TrackSummary};
use bridge_traits::player::SourceId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 64;

/// What happened when a source gave up the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The source was not marked playing.
    NotHeld,
    /// Another source is still playing; no stop was sent.
    HandedOff,
    /// Nothing is playing any more; stop was sent.
    Stopped,
}

/// What happened when a source reported it is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First claim by this source.
    Claimed,
    /// Source already held the slot with different track info, or started
    /// a new track.
    Changed,
    /// Nothing new.
    Unchanged,
}

impl ClaimOutcome {
    pub fn notified(&self) -> bool {
        !matches!(self, ClaimOutcome::Unchanged)
    }
}

enum Command {
    MarkPlaying {
        source: SourceId,
        info: TrackSummary,
        new_track: bool,
        reply: oneshot::Sender<ClaimOutcome>,
    },
    Release {
        source: SourceId,
        reply: oneshot::Sender<ReleaseOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<HashMap<SourceId, TrackSummary>>,
    },
}

/// Cloneable handle to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl CoordinatorHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| MonitorError::CoordinatorClosed)?;
        response.await.map_err(|_| MonitorError::CoordinatorClosed)
    }

    /// Record that `source` is playing `info`.
    ///
    /// `new_track` forces a notification even when `info` is unchanged, so
    /// two files with identical tags still announce separately.
    pub async fn mark_playing(
        &self,
        source: SourceId,
        info: TrackSummary,
        new_track: bool,
    ) -> Result<ClaimOutcome> {
        self.request(|reply| Command::MarkPlaying {
            source,
            info,
            new_track,
            reply,
        })
        .await
    }

    /// Remove `source` from the map and stop if nothing else plays.
    pub async fn release(&self, source: SourceId) -> Result<ReleaseOutcome> {
        self.request(|reply| Command::Release { source, reply }).await
    }

    /// Copy of the map, for observers that join late.
    pub async fn currently_playing(&self) -> Result<HashMap<SourceId, TrackSummary>> {
        self.request(|reply| Command::Snapshot { reply }).await
    }
}

struct Coordinator {
    playing: HashMap<SourceId, TrackSummary>,
    sink: Arc<dyn NotificationSink>,
}

impl Coordinator {
    fn notify(&self, notification: PlaybackNotification) {
        if let Err(e) = self.sink.broadcast(notification) {
            warn!(error = %e, "Failed to broadcast playback notification");
        }
    }

    fn mark_playing(&mut self, source: SourceId, info: TrackSummary, new_track: bool) -> ClaimOutcome {
        let outcome = match self.playing.get(&source) {
            None => ClaimOutcome::Claimed,
            Some(current) if new_track || *current != info => ClaimOutcome::Changed,
            Some(_) => return ClaimOutcome::Unchanged,
        };

        debug!(source = %source, title = %info.title, ?outcome, "Source playing");
        self.playing.insert(source.clone(), info.clone());
        self.notify(PlaybackNotification::now_playing(source, info));
        outcome
    }

    fn release(&mut self, source: SourceId) -> ReleaseOutcome {
        if self.playing.remove(&source).is_none() {
            return ReleaseOutcome::NotHeld;
        }

        if !self.playing.is_empty() {
            debug!(source = %source, others = self.playing.len(), "Playback handed off");
            return ReleaseOutcome::HandedOff;
        }

        debug!(source = %source, "Playback stopped");
        self.notify(PlaybackNotification::stop(source));
        ReleaseOutcome::Stopped
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::MarkPlaying {
                    source,
                    info,
                    new_track,
                    reply,
                } => {
                    let _ = reply.send(self.mark_playing(source, info, new_track));
                }
                Command::Release { source, reply } => {
                    let _ = reply.send(self.release(source));
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.playing.clone());
                }
            }
        }
        debug!("Coordinator shut down");
    }
}

/// Start the coordinator task. It exits once every handle is dropped.
pub fn spawn(sink: Arc<dyn NotificationSink>) -> (CoordinatorHandle, JoinHandle<()>) {
    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let coordinator = Coordinator {
        playing: HashMap::new(),
        sink,
    };
    let task = tokio::spawn(coordinator.run(receiver));
    (CoordinatorHandle { commands }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::notify::NotificationKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<PlaybackNotification>>,
    }

    impl RecordingSink {
        fn kinds(&self) -> Vec<(NotificationKind, String)> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|n| (n.kind, n.source.to_string()))
                .collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn broadcast(&self, notification: PlaybackNotification) -> bridge_traits::error::Result<()> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn track(title: &str) -> TrackSummary {
        TrackSummary {
            title: title.into(),
            album: "Selected Ambient Works".into(),
            artist: "Aphex Twin".into(),
        }
    }

    #[tokio::test]
    async fn test_claim_change_and_repeat() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, _task) = spawn(sink.clone());

        let roon = SourceId::from("roon");
        assert_eq!(
            handle.mark_playing(roon.clone(), track("Xtal"), false).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            handle.mark_playing(roon.clone(), track("Xtal"), false).await.unwrap(),
            ClaimOutcome::Unchanged
        );
        assert_eq!(
            handle.mark_playing(roon, track("Tha"), false).await.unwrap(),
            ClaimOutcome::Changed
        );

        assert_eq!(sink.kinds().len(), 2);
    }

    #[tokio::test]
    async fn test_new_track_with_same_tags_notifies() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, _task) = spawn(sink.clone());

        let roon = SourceId::from("roon");
        handle
            .mark_playing(roon.clone(), track("Xtal"), true)
            .await
            .unwrap();
        assert_eq!(
            handle.mark_playing(roon.clone(), track("Xtal"), true).await.unwrap(),
            ClaimOutcome::Changed
        );
        assert_eq!(
            handle.mark_playing(roon, track("Xtal"), false).await.unwrap(),
            ClaimOutcome::Unchanged
        );

        let kinds = sink.kinds();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.iter().all(|(kind, _)| *kind == NotificationKind::NowPlaying));
    }

    #[tokio::test]
    async fn test_stop_only_when_last_source_releases() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, _task) = spawn(sink.clone());

        handle.mark_playing("roon".into(), track("Xtal"), false).await.unwrap();
        handle
            .mark_playing("audirvana".into(), track("Ageispolis"), false)
            .await
            .unwrap();

        assert_eq!(
            handle.release("roon".into()).await.unwrap(),
            ReleaseOutcome::HandedOff
        );
        assert_eq!(
            handle.release("roon".into()).await.unwrap(),
            ReleaseOutcome::NotHeld
        );
        assert_eq!(
            handle.release("audirvana".into()).await.unwrap(),
            ReleaseOutcome::Stopped
        );

        let kinds = sink.kinds();
        assert_eq!(kinds.len(), 3);
        assert_eq!(
            kinds[2],
            (NotificationKind::Stop, "audirvana".to_string())
        );
    }

    #[tokio::test]
    async fn test_currently_playing_snapshot() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, _task) = spawn(sink);

        handle.mark_playing("roon".into(), track("Xtal"), false).await.unwrap();
        let playing = handle.currently_playing().await.unwrap();
        assert_eq!(playing.len(), 1);
        assert_eq!(playing[&SourceId::from("roon")].title, "Xtal");
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_block() {
        struct FailingSink;
        impl NotificationSink for FailingSink {
            fn broadcast(&self, _: PlaybackNotification) -> bridge_traits::error::Result<()> {
                Err(BridgeError::NotAvailable("no observers".into()))
            }
        }

        let (handle, _task) = spawn(Arc::new(FailingSink));
        assert_eq!(
            handle.mark_playing("roon".into(), track("Xtal"), false).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            handle.release("roon".into()).await.unwrap(),
            ReleaseOutcome::Stopped
        );
    }

    #[tokio::test]
    async fn test_concurrent_release_sends_one_stop() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, _task) = spawn(sink.clone());

        handle.mark_playing("roon".into(), track("Xtal"), false).await.unwrap();
        handle
            .mark_playing("audirvana".into(), track("Tha"), false)
            .await
            .unwrap();

        let a = handle.clone();
        let b = handle.clone();
        let (ra, rb) = tokio::join!(a.release("roon".into()), b.release("audirvana".into()));
        let outcomes = [ra.unwrap(), rb.unwrap()];

        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == ReleaseOutcome::Stopped)
                .count(),
            1
        );
        let stops = sink
            .kinds()
            .into_iter()
            .filter(|(kind, _)| *kind == NotificationKind::Stop)
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn test_closed_coordinator_reports_error() {
        let (handle, task) = spawn(Arc::new(RecordingSink::default()));
        task.abort();
        let _ = task.await;
        assert!(matches!(
            handle.release("roon".into()).await,
            Err(MonitorError::CoordinatorClosed)
        ));
    }
}

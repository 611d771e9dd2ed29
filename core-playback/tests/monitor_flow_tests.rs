//! End-to-end monitor flows against an in-memory ledger.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::notify::{NotificationKind, NotificationSink, PlaybackNotification};
use bridge_traits::player::{NowPlaying, PlayerPoll, PlayerState, PlayerStateProvider, SourceId};
use bridge_traits::scrobble::{
    ScrobbleAck, ScrobbleRequest, ScrobbleService, ServiceError, ServiceResult,
};
use bridge_traits::tags::{TagExtractor, TagMap, WaveInfo, WaveInfoReader};
use bridge_traits::time::ManualClock;
use core_library::db::create_test_pool;
use core_library::models::{PlayCountKey, TrackPlayCount};
use core_library::repositories::{
    Page, PageRequest, PlayCountRepository, ScrobbleRecordRepository, SqlitePlayCountRepository,
    SqliteScrobbleRecordRepository,
};
use core_library::LibraryError;
use core_metadata::{MetadataResolver, DEFAULT_CACHE_CAPACITY};
use core_playback::{
    CancellationToken, EngineParts, MonitorEngine, MonitorError, MonitorState, ReleaseOutcome,
};
use core_runtime::config::MonitorSettings;
use core_sync::{ScrobbleSync, SyncSettings};
use mockall::{mock, Sequence};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    Service {}

    #[async_trait]
    impl ScrobbleService for Service {
        async fn update_now_playing(&self, request: &ScrobbleRequest) -> ServiceResult<()>;
        async fn submit_scrobble(&self, request: &ScrobbleRequest) -> ServiceResult<ScrobbleAck>;
    }
}

#[derive(Clone)]
enum Step {
    Poll(PlayerPoll),
    Fail,
}

/// Replays a fixed script of polls; the last step repeats.
struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedProvider {
    fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
        })
    }
}

#[async_trait]
impl PlayerStateProvider for ScriptedProvider {
    async fn is_running(&self) -> BridgeResult<bool> {
        Err(BridgeError::NotAvailable("scripted".into()))
    }

    async fn state(&self) -> BridgeResult<PlayerState> {
        Err(BridgeError::NotAvailable("scripted".into()))
    }

    async fn now_playing(&self) -> BridgeResult<Option<NowPlaying>> {
        Err(BridgeError::NotAvailable("scripted".into()))
    }

    async fn poll(&self) -> BridgeResult<PlayerPoll> {
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };
        match step {
            Some(Step::Poll(poll)) => Ok(poll),
            Some(Step::Fail) => Err(BridgeError::OperationFailed("osascript exited 1".into())),
            None => Ok(PlayerPoll::NotRunning),
        }
    }
}

struct NoTags;

#[async_trait]
impl TagExtractor for NoTags {
    async fn extract(&self, _: &Path) -> BridgeResult<TagMap> {
        Err(BridgeError::NotAvailable("no extractor".into()))
    }
}

#[async_trait]
impl WaveInfoReader for NoTags {
    async fn read(&self, _: &Path) -> BridgeResult<WaveInfo> {
        Err(BridgeError::NotAvailable("no reader".into()))
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<PlaybackNotification>>,
}

impl RecordingSink {
    fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().iter().map(|n| n.kind).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn broadcast(&self, notification: PlaybackNotification) -> BridgeResult<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

fn playing(title: &str, url: &str, position: f64) -> Step {
    Step::Poll(PlayerPoll::Playing(NowPlaying {
        title: title.into(),
        artist: "Stereolab".into(),
        album: "Dots and Loops".into(),
        duration_secs: 200.0,
        position_secs: position,
        url: url.into(),
    }))
}

fn stopped() -> Step {
    Step::Poll(PlayerPoll::NotPlaying(PlayerState::Stopped))
}

fn acked() -> ServiceResult<ScrobbleAck> {
    Ok(ScrobbleAck {
        accepted: 1,
        ignored: 0,
    })
}

struct Harness {
    records: Arc<SqliteScrobbleRecordRepository>,
    counts: Arc<SqlitePlayCountRepository>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new() -> Self {
        let pool = create_test_pool().await.unwrap();
        Self {
            records: Arc::new(SqliteScrobbleRecordRepository::new(pool.clone())),
            counts: Arc::new(SqlitePlayCountRepository::new(pool)),
            sink: Arc::new(RecordingSink::default()),
            clock: Arc::new(ManualClock::new(1_700_000_010)),
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_millis(10),
            call_timeout: Some(Duration::from_secs(2)),
            ..MonitorSettings::default()
        }
    }

    async fn engine(&self, service: MockService) -> MonitorEngine {
        self.engine_with(service, Self::settings()).await
    }

    async fn engine_with(&self, service: MockService, settings: MonitorSettings) -> MonitorEngine {
        let sync = ScrobbleSync::new(
            Arc::new(service),
            self.records.clone(),
            SyncSettings {
                call_timeout: Some(Duration::from_secs(2)),
                batch_limit: 10,
                submission_delay: Duration::ZERO,
                stop_on_failure: false,
            },
        );
        MonitorEngine::new(EngineParts {
            resolver: Arc::new(MetadataResolver::new(
                Arc::new(NoTags),
                Arc::new(NoTags),
                DEFAULT_CACHE_CAPACITY,
            )),
            sync: Arc::new(sync),
            counts: self.counts.clone(),
            sink: self.sink.clone(),
            clock: self.clock.clone(),
            settings,
            reconcile_interval: None,
        })
        .await
        .unwrap()
    }

    async fn play_count(&self, track: &str) -> i64 {
        self.counts
            .get(&PlayCountKey::new("Stereolab", "Dots and Loops", track))
            .await
            .unwrap()
            .map(|row| row.play_count)
            .unwrap_or(0)
    }
}

#[tokio::test]
async fn test_single_scrobble_when_threshold_crossed() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(1)
        .returning(|_| Ok(()));
    service
        .expect_submit_scrobble()
        .withf(|r| r.track == "Brakhage" && r.timestamp == 1_700_000_000)
        .times(1)
        .returning(|_| acked());

    let source = SourceId::from("audirvana");
    let provider = ScriptedProvider::new([
        playing("Brakhage", "/nonexistent/dots/01.flac", 10.0),
        playing("Brakhage", "/nonexistent/dots/01.flac", 70.0),
        playing("Brakhage", "/nonexistent/dots/01.flac", 90.0),
        playing("Brakhage", "/nonexistent/dots/01.flac", 115.0),
        playing("Brakhage", "/nonexistent/dots/01.flac", 180.0),
    ]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    let first = monitor.tick().await;
    assert!(first.track_changed);
    assert!(!first.scrobbled);

    for _ in 0..2 {
        harness.clock.advance(60);
        let outcome = monitor.tick().await;
        assert!(!outcome.track_changed);
        assert!(!outcome.scrobbled);
    }

    harness.clock.advance(25);
    assert!(monitor.tick().await.scrobbled);

    harness.clock.advance(65);
    assert!(!monitor.tick().await.scrobbled);

    assert_eq!(monitor.state(), MonitorState::Playing);
    assert_eq!(harness.play_count("Brakhage").await, 1);
    assert_eq!(engine.submitted_count(), 1);
    let unsent = harness.records.count_unsent().await.unwrap();
    assert_eq!(unsent, 0);
}

#[tokio::test]
async fn test_track_change_clears_previous_marker() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(3)
        .returning(|_| Ok(()));
    service
        .expect_submit_scrobble()
        .times(2)
        .returning(|_| acked());

    let source = SourceId::from("audirvana");
    let provider = ScriptedProvider::new([
        playing("Miss Modular", "/nonexistent/dots/02.flac", 120.0),
        playing("The Flower Called Nowhere", "/nonexistent/dots/03.flac", 5.0),
        playing("Miss Modular", "/nonexistent/dots/02.flac", 150.0),
    ]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    let first = monitor.tick().await;
    assert!(first.track_changed && first.scrobbled);

    let second = monitor.tick().await;
    assert!(second.track_changed && !second.scrobbled);

    let replay = monitor.tick().await;
    assert!(replay.track_changed && replay.scrobbled);

    assert_eq!(harness.play_count("Miss Modular").await, 2);
}

#[tokio::test]
async fn test_now_playing_precedes_scrobble_on_first_tick() {
    let harness = Harness::new().await;

    let mut seq = Sequence::new();
    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .withf(|r| r.track == "Lo Boob Oscillator")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    service
        .expect_submit_scrobble()
        .withf(|r| r.track == "Lo Boob Oscillator")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| acked());

    let source = SourceId::from("audirvana");
    let provider = ScriptedProvider::new([playing(
        "Lo Boob Oscillator",
        "/nonexistent/dots/04.flac",
        120.0,
    )]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    let outcome = monitor.tick().await;
    assert!(outcome.track_changed);
    assert!(outcome.scrobbled);
}

#[tokio::test]
async fn test_identical_tags_on_new_path_notify_again() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(2)
        .returning(|_| Ok(()));
    service.expect_submit_scrobble().never();

    let source = SourceId::from("audirvana");
    let provider = ScriptedProvider::new([
        playing("Brakhage", "/nonexistent/dots/01.flac", 10.0),
        playing("Brakhage", "/nonexistent/dots-remaster/01.flac", 10.0),
    ]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    assert!(monitor.tick().await.track_changed);
    assert!(monitor.tick().await.track_changed);

    assert_eq!(
        harness.sink.kinds(),
        vec![NotificationKind::NowPlaying, NotificationKind::NowPlaying]
    );
}

#[tokio::test]
async fn test_quiet_ticks_back_off_until_playback_resumes() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(1)
        .returning(|_| Ok(()));
    service.expect_submit_scrobble().never();

    let settings = MonitorSettings {
        poll_interval: Duration::from_secs(3),
        idle_poll_interval: Duration::from_secs(60),
        idle_tick_threshold: 3,
        call_timeout: Some(Duration::from_secs(2)),
        ..MonitorSettings::default()
    };

    let source = SourceId::from("roon");
    let provider = ScriptedProvider::new([
        Step::Poll(PlayerPoll::NotRunning),
        Step::Fail,
        Step::Poll(PlayerPoll::NotRunning),
        Step::Poll(PlayerPoll::NotRunning),
        playing("Diagonals", "", 10.0),
    ]);
    let engine = harness
        .engine_with(service, settings)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    for _ in 0..2 {
        monitor.tick().await;
        assert_eq!(monitor.interval().current(), Duration::from_secs(3));
    }

    // Provider failure above counted as a quiet tick.
    monitor.tick().await;
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert_eq!(monitor.interval().current(), Duration::from_secs(60));

    monitor.tick().await;
    assert_eq!(monitor.interval().current(), Duration::from_secs(60));

    assert!(monitor.tick().await.track_changed);
    assert_eq!(monitor.state(), MonitorState::Playing);
    assert_eq!(monitor.interval().current(), Duration::from_secs(3));
}

#[tokio::test]
async fn test_same_url_different_title_is_new_track() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(2)
        .returning(|_| Ok(()));
    service.expect_submit_scrobble().never();

    let source = SourceId::from("audirvana");
    let provider = ScriptedProvider::new([
        playing("Prisoner of Mars", "/nonexistent/dots.cue", 10.0),
        playing("Rainbo Conversation", "/nonexistent/dots.cue", 10.0),
    ]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    assert!(monitor.tick().await.track_changed);
    assert!(monitor.tick().await.track_changed);
}

#[tokio::test]
async fn test_remote_failure_keeps_record_unsent_and_counts() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .returning(|_| Err(ServiceError::Transport("offline".into())));
    service
        .expect_submit_scrobble()
        .times(1)
        .returning(|_| Err(ServiceError::Transport("offline".into())));

    let source = SourceId::from("roon");
    let provider = ScriptedProvider::new([
        playing("Contronatura", "", 130.0),
        playing("Contronatura", "", 160.0),
    ]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    assert!(monitor.tick().await.scrobbled);
    assert!(!monitor.tick().await.scrobbled);

    let unsent = harness.records.list_unsent(10).await.unwrap();
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].source, "roon");
    assert_eq!(harness.play_count("Contronatura").await, 1);
}

#[tokio::test]
async fn test_zero_duration_never_scrobbles() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(1)
        .returning(|_| Ok(()));
    service.expect_submit_scrobble().never();

    let source = SourceId::from("roon");
    let provider = ScriptedProvider::new([Step::Poll(PlayerPoll::Playing(NowPlaying {
        title: "Radio stream".into(),
        artist: "Stereolab".into(),
        album: String::new(),
        duration_secs: 0.0,
        position_secs: 500.0,
        url: String::new(),
    }))]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    for _ in 0..3 {
        assert!(!monitor.tick().await.scrobbled);
    }
}

#[tokio::test]
async fn test_provider_error_keeps_state() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(1)
        .returning(|_| Ok(()));
    service.expect_submit_scrobble().never();

    let source = SourceId::from("audirvana");
    let provider = ScriptedProvider::new([
        playing("Ticker-tape of the Unconscious", "/nonexistent/dots/05.flac", 10.0),
        Step::Fail,
        playing("Ticker-tape of the Unconscious", "/nonexistent/dots/05.flac", 20.0),
    ]);
    let engine = harness
        .engine(service)
        .await
        .with_source(source.clone(), provider);
    let mut monitor = engine.monitor(&source).unwrap();

    monitor.tick().await;
    let failed = monitor.tick().await;
    assert!(failed.provider_failed);
    assert_eq!(monitor.state(), MonitorState::Playing);

    let resumed = monitor.tick().await;
    assert!(!resumed.track_changed);
}

#[tokio::test]
async fn test_stop_sent_only_after_last_source_stops() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service.expect_update_now_playing().returning(|_| Ok(()));
    service.expect_submit_scrobble().never();

    let audirvana = SourceId::from("audirvana");
    let roon = SourceId::from("roon");
    let engine = harness
        .engine(service)
        .await
        .with_source(
            audirvana.clone(),
            ScriptedProvider::new([
                playing("Refractions in the Plastic Pulse", "/nonexistent/dots/07.flac", 10.0),
                stopped(),
            ]),
        )
        .with_source(
            roon.clone(),
            ScriptedProvider::new([playing("Diagonals", "", 10.0), stopped()]),
        );

    let mut first = engine.monitor(&audirvana).unwrap();
    let mut second = engine.monitor(&roon).unwrap();

    first.tick().await;
    second.tick().await;

    assert_eq!(first.tick().await.released, Some(ReleaseOutcome::HandedOff));
    assert_eq!(second.tick().await.released, Some(ReleaseOutcome::Stopped));
    assert_eq!(second.tick().await.released, None);

    let kinds = harness.sink.kinds();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::NowPlaying,
            NotificationKind::NowPlaying,
            NotificationKind::Stop
        ]
    );
    assert!(engine.coordinator().currently_playing().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gauge_seeded_from_play_total() {
    let harness = Harness::new().await;
    let key = PlayCountKey::new("Stereolab", "Dots and Loops", "Brakhage");
    harness.counts.increment(&key).await.unwrap();
    harness.counts.increment(&key).await.unwrap();

    let engine = harness.engine(MockService::new()).await;
    assert_eq!(engine.submitted_count(), 2);
}

#[tokio::test]
async fn test_gauge_seed_failure_is_fatal() {
    struct BrokenCounts;

    #[async_trait]
    impl PlayCountRepository for BrokenCounts {
        async fn increment(&self, _: &PlayCountKey) -> core_library::Result<TrackPlayCount> {
            Err(LibraryError::Migration("schema missing".into()))
        }
        async fn get(&self, _: &PlayCountKey) -> core_library::Result<Option<TrackPlayCount>> {
            Ok(None)
        }
        async fn top(&self, _: PageRequest) -> core_library::Result<Page<TrackPlayCount>> {
            Err(LibraryError::Migration("schema missing".into()))
        }
        async fn all(&self) -> core_library::Result<Vec<TrackPlayCount>> {
            Err(LibraryError::Migration("schema missing".into()))
        }
        async fn by_artist(&self, _: &str) -> core_library::Result<Vec<TrackPlayCount>> {
            Err(LibraryError::Migration("schema missing".into()))
        }
        async fn total_plays(&self) -> core_library::Result<i64> {
            Err(LibraryError::Migration("schema missing".into()))
        }
    }

    let harness = Harness::new().await;
    let sync = ScrobbleSync::new(
        Arc::new(MockService::new()),
        harness.records.clone(),
        SyncSettings::default(),
    );
    let result = MonitorEngine::new(EngineParts {
        resolver: Arc::new(MetadataResolver::new(
            Arc::new(NoTags),
            Arc::new(NoTags),
            DEFAULT_CACHE_CAPACITY,
        )),
        sync: Arc::new(sync),
        counts: Arc::new(BrokenCounts),
        sink: harness.sink.clone(),
        clock: harness.clock.clone(),
        settings: Harness::settings(),
        reconcile_interval: None,
    })
    .await;

    assert!(matches!(result, Err(MonitorError::GaugeSeed(_))));
}

#[tokio::test]
async fn test_spawned_engine_scrobbles_and_stops_on_shutdown() {
    let harness = Harness::new().await;

    let mut service = MockService::new();
    service
        .expect_update_now_playing()
        .times(1)
        .returning(|_| Ok(()));
    service
        .expect_submit_scrobble()
        .times(1)
        .returning(|_| acked());

    let engine = harness.engine(service).await.with_source(
        "audirvana".into(),
        ScriptedProvider::new([playing("Parsec", "/nonexistent/dots/08.flac", 150.0)]),
    );

    let handle = engine.spawn(CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.submitted_count(), 1);

    let sink = harness.sink.clone();
    handle.shutdown().await;

    assert_eq!(
        sink.kinds(),
        vec![NotificationKind::NowPlaying, NotificationKind::Stop]
    );
    assert_eq!(harness.play_count("Parsec").await, 1);
}

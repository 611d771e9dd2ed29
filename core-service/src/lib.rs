//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, tag backends, player providers) into the scrobbler core. Desktop
//! builds enable the `desktop-shims` feature, which depends on
//! `bridge-desktop` and also builds the `scrobbler` binary.
//!
//! ```ignore
//! let config = ScrobblerConfig::from_toml_file("scrobbler.toml")?;
//! let service = core_service::bootstrap_desktop(config).await?;
//!
//! let mut events = service.subscribe();
//! let engine = service.start(CancellationToken::new()).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::{
    http::HttpClient,
    player::{PlayerStateProvider, SourceId},
    storage::SecureStore,
    tags::{TagExtractor, WaveInfoReader},
    time::{Clock, SystemClock},
};
use core_library::analysis::{ListeningAnalysis, ListeningReport, Recommendation};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::{ScrobbleRecord, TrackPlayCount};
use core_library::repositories::{
    ConflictRetryPolicy, Page, PageRequest, PlayCountRepository, ScrobbleRecordRepository,
    SqlitePlayCountRepository, SqliteScrobbleRecordRepository,
};
use core_metadata::MetadataResolver;
use core_playback::{CancellationToken, EngineHandle, EngineParts, MonitorEngine};
use core_runtime::config::ScrobblerConfig;
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use core_sync::{CatchUpReport, LastFmScrobbler, ScrobbleSync, SyncSettings};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Option<Arc<dyn SecureStore>>,
    pub tag_extractor: Arc<dyn TagExtractor>,
    pub wave_reader: Arc<dyn WaveInfoReader>,
    pub clock: Arc<dyn Clock>,
    pub providers: Vec<(SourceId, Arc<dyn PlayerStateProvider>)>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        tag_extractor: Arc<dyn TagExtractor>,
        wave_reader: Arc<dyn WaveInfoReader>,
    ) -> Self {
        Self {
            http_client,
            secure_store: None,
            tag_extractor,
            wave_reader,
            clock: Arc::new(SystemClock),
            providers: Vec::new(),
        }
    }

    pub fn with_secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_provider(
        mut self,
        source: SourceId,
        provider: Arc<dyn PlayerStateProvider>,
    ) -> Self {
        self.providers.push((source, provider));
        self
    }
}

impl std::fmt::Debug for CoreDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreDependencies")
            .field("secure_store", &self.secure_store.is_some())
            .field(
                "providers",
                &self.providers.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct ScrobblerService {
    config: Arc<ScrobblerConfig>,
    deps: Arc<CoreDependencies>,
    records: Arc<SqliteScrobbleRecordRepository>,
    counts: Arc<SqlitePlayCountRepository>,
    resolver: Arc<MetadataResolver>,
    sync: Arc<ScrobbleSync>,
    analysis: Arc<ListeningAnalysis>,
    events: EventBus,
}

impl ScrobblerService {
    /// Open the database and build every shared component.
    pub async fn new(config: ScrobblerConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let records = Arc::new(SqliteScrobbleRecordRepository::new(pool.clone()));
        let counts = Arc::new(SqlitePlayCountRepository::with_retry_policy(
            pool,
            ConflictRetryPolicy {
                max_attempts: config.counter_retry.max_attempts,
                base_delay: config.counter_retry.base_delay,
                max_delay: config.counter_retry.max_delay,
            },
        ));

        let capacity = NonZeroUsize::new(config.metadata_cache_capacity).ok_or_else(|| {
            CoreError::InitializationFailed("metadata cache capacity must be positive".into())
        })?;
        let resolver = Arc::new(MetadataResolver::new(
            Arc::clone(&deps.tag_extractor),
            Arc::clone(&deps.wave_reader),
            capacity,
        ));

        let mut lastfm = LastFmScrobbler::new(Arc::clone(&deps.http_client), config.lastfm.clone());
        if let Some(store) = &deps.secure_store {
            lastfm = lastfm.with_secure_store(Arc::clone(store));
        }
        let sync = Arc::new(ScrobbleSync::new(
            Arc::new(lastfm),
            records.clone(),
            SyncSettings::from_config(&config.monitor, &config.reconcile),
        ));

        let analysis = Arc::new(ListeningAnalysis::new(counts.clone(), records.clone()));

        info!(database = %config.database_path.display(), "Scrobbler service ready");
        Ok(Self {
            config: Arc::new(config),
            deps: Arc::new(deps),
            records,
            counts,
            resolver,
            sync,
            analysis,
            events: EventBus::new(DEFAULT_EVENT_BUFFER_SIZE),
        })
    }

    pub fn config(&self) -> &ScrobblerConfig {
        &self.config
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    /// Playback notifications from every running engine of this service.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Start monitoring every configured source that has a provider.
    pub async fn start(&self, cancel: CancellationToken) -> Result<EngineHandle> {
        let mut engine = MonitorEngine::new(EngineParts {
            resolver: Arc::clone(&self.resolver),
            sync: Arc::clone(&self.sync),
            counts: self.counts.clone(),
            sink: Arc::new(self.events.clone()),
            clock: Arc::clone(&self.deps.clock),
            settings: self.config.monitor.clone(),
            reconcile_interval: self.config.reconcile.interval,
        })
        .await?;

        for kind in &self.config.sources {
            let id = kind.source_id();
            match self.deps.providers.iter().find(|(source, _)| *source == id) {
                Some((_, provider)) => engine.add_source(id, Arc::clone(provider)),
                None => warn!(source = %id, "No provider registered for configured source"),
            }
        }

        if engine.sources().next().is_none() {
            return Err(CoreError::CapabilityMissing {
                capability: "PlayerStateProvider".to_string(),
                message: "none of the configured sources has a provider".to_string(),
            });
        }

        Ok(engine.spawn(cancel))
    }

    /// Resubmit up to `limit` unsent scrobbles, oldest first.
    pub async fn sync_records(&self, limit: Option<u32>) -> Result<CatchUpReport> {
        Ok(self.sync.catch_up(limit).await?)
    }

    /// Most-played tracks.
    pub async fn top_plays(&self, page: PageRequest) -> Result<Page<TrackPlayCount>> {
        Ok(self.counts.top(page).await?)
    }

    /// Recorded listens, newest first.
    pub async fn history(&self, page: PageRequest) -> Result<Page<ScrobbleRecord>> {
        Ok(self.records.query(page).await?)
    }

    /// Unsent listens waiting for catch-up.
    pub async fn pending_count(&self) -> Result<i64> {
        Ok(self.records.count_unsent().await?)
    }

    /// Track total, most played tracks and latest listens.
    pub async fn report(&self) -> Result<ListeningReport> {
        Ok(self.analysis.report().await?)
    }

    /// Recommended tracks, optionally restricted to one artist.
    pub async fn recommend(&self, limit: usize, artist: Option<&str>) -> Result<Vec<Recommendation>> {
        let picks = match artist {
            Some(artist) => self.analysis.recommend_for_artist(artist, limit).await?,
            None => self.analysis.recommend(limit).await?,
        };
        Ok(picks)
    }

    /// Build a report every `period` until `cancel` fires. The first report
    /// is built immediately; a failed report is logged and skipped.
    pub async fn run_report_schedule<F>(
        &self,
        period: Duration,
        cancel: CancellationToken,
        mut on_report: F,
    ) -> Result<()>
    where
        F: FnMut(ListeningReport) + Send,
    {
        if period.is_zero() {
            return Err(core_runtime::Error::Config(
                "report interval must be greater than zero".to_string(),
            )
            .into());
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.report().await {
                    Ok(report) => on_report(report),
                    Err(e) => warn!(error = %e, "Scheduled listening report failed"),
                },
            }
        }
        Ok(())
    }
}

/// Desktop bridges for the configured sources.
#[cfg(feature = "desktop-shims")]
pub fn desktop_dependencies(config: &ScrobblerConfig) -> Result<CoreDependencies> {
    use bridge_desktop::{
        AudirvanaProvider, ExiftoolExtractor, KeyringSecureStore, LoftyWaveReader,
        ReqwestHttpClient, RoonProvider,
    };
    use core_runtime::config::SourceKind;

    let http = ReqwestHttpClient::new()?;
    let mut deps = CoreDependencies::new(
        Arc::new(http),
        Arc::new(ExiftoolExtractor::new()),
        Arc::new(LoftyWaveReader::new()),
    )
    .with_secure_store(Arc::new(KeyringSecureStore::new()));

    for kind in &config.sources {
        let provider: Arc<dyn PlayerStateProvider> = match kind {
            SourceKind::Audirvana => Arc::new(AudirvanaProvider::new()),
            SourceKind::Roon => Arc::new(RoonProvider::new()),
        };
        deps = deps.with_provider(kind.source_id(), provider);
    }

    Ok(deps)
}

/// Convenience bootstrapper for desktop hosts.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: ScrobblerConfig) -> Result<ScrobblerService> {
    let deps = desktop_dependencies(&config)?;
    ScrobblerService::new(config, deps).await
}

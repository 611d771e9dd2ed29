//! # Scrobbler Configuration Module
//!
//! ## Overview
//!
//! [`ScrobblerConfig`] holds every tunable of the scrobbler: database
//! location, Last.fm credentials, monitor timing, cache and retry bounds,
//! reconciliation policy, enabled player sources and logging. It is built
//! either with [`ScrobblerConfigBuilder`] or loaded from a TOML file, and in
//! both cases validated fail-fast.
//!
//! ## Usage
//!
//! ### Builder
//!
//! ```ignore
//! use core_runtime::config::ScrobblerConfig;
//!
//! let config = ScrobblerConfig::builder()
//!     .database_path("/Users/someone/.scrobbler/scrobbler.db")
//!     .lastfm_credentials("api-key", "shared-secret")
//!     .session_key("user-session-key")
//!     .build()?;
//! ```
//!
//! ### TOML
//!
//! ```toml
//! database_path = "/Users/someone/.scrobbler/scrobbler.db"
//! sources = ["audirvana", "roon"]
//!
//! [lastfm]
//! api_key = "..."
//! shared_secret = "..."
//! username = "someone"
//! password = "..."
//!
//! [monitor]
//! poll_interval_secs = 3
//! scrobble_threshold = 0.55
//!
//! [reconcile]
//! batch_limit = 10
//! interval_secs = 900
//! ```
//!
//! Every section except `lastfm` and `database_path` is optional and falls
//! back to the defaults listed on each field.

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use bridge_traits::player::SourceId;
use bridge_traits::time::LogLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level scrobbler configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrobblerConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    pub lastfm: LastFmConfig,

    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Maximum number of resolved tag handles kept in memory
    #[serde(default = "default_cache_capacity")]
    pub metadata_cache_capacity: usize,

    #[serde(default)]
    pub counter_retry: CounterRetrySettings,

    #[serde(default)]
    pub reconcile: ReconcileSettings,

    /// Player sources to monitor
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceKind>,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl fmt::Debug for ScrobblerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrobblerConfig")
            .field("database_path", &self.database_path)
            .field("lastfm", &self.lastfm)
            .field("monitor", &self.monitor)
            .field("metadata_cache_capacity", &self.metadata_cache_capacity)
            .field("counter_retry", &self.counter_retry)
            .field("reconcile", &self.reconcile)
            .field("sources", &self.sources)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Last.fm API credentials.
///
/// Either a pre-authorized `session_key`, or `username` + `password` for
/// mobile authentication, must be present.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub api_key: String,
    pub shared_secret: String,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl LastFmConfig {
    pub fn new(api_key: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            shared_secret: shared_secret.into(),
            ..Self::default()
        }
    }

    /// Whether username and password are both present and non-empty.
    pub fn has_user_credentials(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.username) && present(&self.password)
    }

    pub fn has_session_key(&self) -> bool {
        self.session_key.as_deref().is_some_and(|v| !v.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("Last.fm api_key cannot be empty".to_string()));
        }
        if self.shared_secret.trim().is_empty() {
            return Err(Error::Config(
                "Last.fm shared_secret cannot be empty".to_string(),
            ));
        }
        if !self.has_session_key() && !self.has_user_credentials() {
            return Err(Error::Config(
                "Last.fm needs either session_key or username and password".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for LastFmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("LastFmConfig")
            .field("api_key", &"[REDACTED]")
            .field("shared_secret", &"[REDACTED]")
            .field("session_key", &redacted(&self.session_key))
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

/// Per-source monitor loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Delay between polls while something is playing (default 3s)
    #[serde(rename = "poll_interval_secs", with = "serde_secs", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Delay between polls once the source has been idle long enough (default 60s)
    #[serde(
        rename = "idle_poll_interval_secs",
        with = "serde_secs",
        default = "default_idle_poll_interval"
    )]
    pub idle_poll_interval: Duration,

    /// Consecutive idle ticks before switching to the idle interval (default 100)
    #[serde(default = "default_idle_tick_threshold")]
    pub idle_tick_threshold: u32,

    /// Fraction of the track that must have played before scrobbling (default 0.55)
    #[serde(default = "default_scrobble_threshold")]
    pub scrobble_threshold: f64,

    /// Bound on each provider query and remote submission (default 10s)
    #[serde(
        rename = "call_timeout_secs",
        with = "serde_opt_secs",
        default = "default_call_timeout"
    )]
    pub call_timeout: Option<Duration>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            idle_poll_interval: default_idle_poll_interval(),
            idle_tick_threshold: default_idle_tick_threshold(),
            scrobble_threshold: default_scrobble_threshold(),
            call_timeout: default_call_timeout(),
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() || self.idle_poll_interval.is_zero() {
            return Err(Error::Config(
                "Poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.idle_tick_threshold == 0 {
            return Err(Error::Config(
                "idle_tick_threshold must be greater than zero".to_string(),
            ));
        }
        if !(self.scrobble_threshold > 0.0 && self.scrobble_threshold < 1.0) {
            return Err(Error::Config(format!(
                "scrobble_threshold must be between 0 and 1 (exclusive), got {}",
                self.scrobble_threshold
            )));
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config(
                "call_timeout must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounded retry for optimistic play-count updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRetrySettings {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base_delay_ms", with = "serde_millis", default = "default_retry_base")]
    pub base_delay: Duration,

    #[serde(rename = "max_delay_ms", with = "serde_millis", default = "default_retry_max")]
    pub max_delay: Duration,
}

impl Default for CounterRetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay: default_retry_base(),
            max_delay: default_retry_max(),
        }
    }
}

/// Catch-up submission of records that never reached the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Records per batch (default 10)
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,

    /// Pause between consecutive submissions (default 100ms)
    #[serde(
        rename = "submission_delay_ms",
        with = "serde_millis",
        default = "default_submission_delay"
    )]
    pub submission_delay: Duration,

    /// Run a batch periodically while monitoring; `None` disables it
    #[serde(rename = "interval_secs", with = "serde_opt_secs", default)]
    pub interval: Option<Duration>,

    /// Abort the batch at the first failed submission
    #[serde(default)]
    pub stop_on_failure: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            submission_delay: default_submission_delay(),
            interval: None,
            stop_on_failure: false,
        }
    }
}

/// Supported player sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Audirvana,
    Roon,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Audirvana => "audirvana",
            SourceKind::Roon => "roon",
        }
    }

    pub fn source_id(&self) -> SourceId {
        SourceId::new(self.as_str())
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
    /// Raw `EnvFilter` directives, overriding `level`
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            filter: None,
        }
    }
}

impl LoggingSettings {
    pub fn to_logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::default()
            .with_level(self.level)
            .with_format(self.format);
        match &self.filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }
}

impl ScrobblerConfig {
    pub fn builder() -> ScrobblerConfigBuilder {
        ScrobblerConfigBuilder::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ScrobblerConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a TOML config file.
    ///
    /// A relative `database_path` is resolved against the file's directory.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if config.database_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.database_path = parent.join(&config.database_path);
            }
        }
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Last.fm credentials are usable
    /// - Monitor timing and threshold are in range
    /// - Cache capacity, retry bounds and batch size are positive
    /// - At least one source is enabled, without duplicates
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.lastfm.validate()?;
        self.monitor.validate()?;

        if self.metadata_cache_capacity == 0 {
            return Err(Error::Config(
                "metadata_cache_capacity must be greater than zero".to_string(),
            ));
        }

        if self.counter_retry.max_attempts == 0 {
            return Err(Error::Config(
                "counter_retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.counter_retry.base_delay > self.counter_retry.max_delay {
            return Err(Error::Config(
                "counter_retry.base_delay cannot exceed max_delay".to_string(),
            ));
        }

        if self.reconcile.batch_limit == 0 {
            return Err(Error::Config(
                "reconcile.batch_limit must be greater than zero".to_string(),
            ));
        }
        if self.reconcile.interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::Config(
                "reconcile.interval must be greater than zero when set".to_string(),
            ));
        }

        if self.sources.is_empty() {
            return Err(Error::Config(
                "At least one player source must be enabled".to_string(),
            ));
        }
        for (i, source) in self.sources.iter().enumerate() {
            if self.sources[..i].contains(source) {
                return Err(Error::Config(format!("Source '{}' listed twice", source)));
            }
        }

        Ok(())
    }
}

/// Builder for [`ScrobblerConfig`].
#[derive(Debug, Default)]
pub struct ScrobblerConfigBuilder {
    database_path: Option<PathBuf>,
    lastfm: LastFmConfig,
    monitor: MonitorSettings,
    metadata_cache_capacity: Option<usize>,
    counter_retry: CounterRetrySettings,
    reconcile: ReconcileSettings,
    sources: Option<Vec<SourceKind>>,
    logging: LoggingSettings,
}

impl ScrobblerConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn lastfm_credentials(
        mut self,
        api_key: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> Self {
        self.lastfm.api_key = api_key.into();
        self.lastfm.shared_secret = shared_secret.into();
        self
    }

    pub fn session_key(mut self, session_key: impl Into<String>) -> Self {
        self.lastfm.session_key = Some(session_key.into());
        self
    }

    pub fn user_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.lastfm.username = Some(username.into());
        self.lastfm.password = Some(password.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.monitor.poll_interval = interval;
        self
    }

    pub fn idle_poll_interval(mut self, interval: Duration) -> Self {
        self.monitor.idle_poll_interval = interval;
        self
    }

    pub fn idle_tick_threshold(mut self, ticks: u32) -> Self {
        self.monitor.idle_tick_threshold = ticks;
        self
    }

    pub fn scrobble_threshold(mut self, threshold: f64) -> Self {
        self.monitor.scrobble_threshold = threshold;
        self
    }

    /// `None` disables the timeout on provider and remote calls.
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.monitor.call_timeout = timeout;
        self
    }

    pub fn metadata_cache_capacity(mut self, capacity: usize) -> Self {
        self.metadata_cache_capacity = Some(capacity);
        self
    }

    pub fn counter_retry(mut self, retry: CounterRetrySettings) -> Self {
        self.counter_retry = retry;
        self
    }

    pub fn reconcile(mut self, reconcile: ReconcileSettings) -> Self {
        self.reconcile = reconcile;
        self
    }

    pub fn sources(mut self, sources: impl IntoIterator<Item = SourceKind>) -> Self {
        self.sources = Some(sources.into_iter().collect());
        self
    }

    pub fn logging(mut self, logging: LoggingSettings) -> Self {
        self.logging = logging;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the database path is missing or any
    /// setting fails [`ScrobblerConfig::validate`].
    pub fn build(self) -> Result<ScrobblerConfig> {
        let database_path = self
            .database_path
            .ok_or_else(|| Error::Config("Database path is required".to_string()))?;

        let config = ScrobblerConfig {
            database_path,
            lastfm: self.lastfm,
            monitor: self.monitor,
            metadata_cache_capacity: self
                .metadata_cache_capacity
                .unwrap_or_else(default_cache_capacity),
            counter_retry: self.counter_retry,
            reconcile: self.reconcile,
            sources: self.sources.unwrap_or_else(default_sources),
            logging: self.logging,
        };

        config.validate()?;
        Ok(config)
    }
}

// Default values
fn default_cache_capacity() -> usize {
    200
}

fn default_sources() -> Vec<SourceKind> {
    vec![SourceKind::Audirvana, SourceKind::Roon]
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_idle_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_idle_tick_threshold() -> u32 {
    100
}

fn default_scrobble_threshold() -> f64 {
    0.55
}

fn default_call_timeout() -> Option<Duration> {
    Some(Duration::from_secs(10))
}

fn default_retry_attempts() -> u32 {
    32
}

fn default_retry_base() -> Duration {
    Duration::from_millis(5)
}

fn default_retry_max() -> Duration {
    Duration::from_millis(250)
}

fn default_batch_limit() -> u32 {
    10
}

fn default_submission_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

mod serde_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod serde_opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}

mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

//! Integration tests for the logging pipeline

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

// Only test in this binary that installs the global subscriber.
#[test]
fn test_init_logging_forwards_redacted_events() {
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).unwrap();
    assert!(init_logging(config).is_err());

    tracing::info!(
        target: "core_sync",
        method = "track.scrobble",
        api_sig = "0123456789abcdef",
        "Submitting scrobble"
    );
    tracing::debug!(target: "core_sync", "below the configured level");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Submitting scrobble");
    assert_eq!(
        entries[0].fields.get("method"),
        Some(&"track.scrobble".to_string())
    );
    assert_eq!(
        entries[0].fields.get("api_sig"),
        Some(&"[REDACTED]".to_string())
    );
}

#[test]
fn test_credentials_are_redacted() {
    for field in ["session_key", "sk", "api_key", "api_sig", "password", "lastfm_secret"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]", "{field}");
    }
    assert_eq!(redact_if_sensitive("SESSION_KEY", "value"), "[REDACTED]");
}

#[test]
fn test_track_fields_pass_through() {
    assert_eq!(redact_if_sensitive("title", "Teardrop"), "Teardrop");
    assert_eq!(redact_if_sensitive("artist", "Massive Attack"), "Massive Attack");
    assert_eq!(redact_if_sensitive("source", "roon"), "roon");
    // "sk" only matches as a whole name
    assert_eq!(redact_if_sensitive("task", "catch-up"), "catch-up");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/Users/someone/Music/Mezzanine/01.flac"), "01.flac");
    assert_eq!(strip_path("C:\\Users\\someone\\Music\\01.flac"), "01.flac");
    assert_eq!(strip_path("01.flac"), "01.flac");
    assert_eq!(strip_path("/var/log/"), "");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Warn)
        .with_secret_redaction(false)
        .with_filter("core_playback=debug,core_sync=trace")
        .with_spans(true)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_secrets);
    assert_eq!(
        config.filter.as_deref(),
        Some("core_playback=debug,core_sync=trace")
    );
    assert!(config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
    assert!(config.logger_sink.is_none());
}

//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every scrobbler crate:
//! - Logging and tracing bootstrap
//! - Configuration loading and validation
//! - Playback notification bus
//!
//! ## Overview
//!
//! Nothing here knows about players or Last.fm; the crate only establishes
//! the conventions (error type, log format, config shape, event fan-out) the
//! other crates build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{
    CounterRetrySettings, LastFmConfig, LoggingSettings, MonitorSettings, ReconcileSettings,
    ScrobblerConfig, ScrobblerConfigBuilder, SourceKind,
};
pub use error::{Error, Result};
pub use events::{EventBus, EventStream};

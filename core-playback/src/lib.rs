//! # Playback Monitoring Module
//!
//! Watches local players and turns what they report into now-playing
//! updates, scrobbles and play counts.
//!
//! ## Overview
//!
//! This module handles:
//! - Per-source polling with an adaptive interval
//! - Track identity and scrobble-threshold decisions
//! - Coordination of the "currently playing" slot across sources
//! - Engine startup, background catch-up and shutdown

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod identity;
pub mod interval;
pub mod monitor;

pub use coordinator::{ClaimOutcome, CoordinatorHandle, ReleaseOutcome};
pub use engine::{EngineHandle, EngineParts, MonitorEngine};
pub use error::{MonitorError, Result};
pub use identity::{PlaybackSnapshot, TrackIdentity};
pub use interval::AdaptiveInterval;
pub use monitor::{build_request, MonitorContext, MonitorState, PlaybackMonitor, TickOutcome};
pub use tokio_util::sync::CancellationToken;

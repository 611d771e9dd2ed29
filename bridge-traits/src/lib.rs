//! # Host Bridge Traits
//!
//! Capability traits at the edge of the scrobbler core.
//!
//! ## Overview
//!
//! The core never shells out, opens sockets or touches the keychain itself.
//! Everything outside the process goes through one of these traits, and each
//! host ships concrete adapters (see `bridge-desktop`).
//!
//! ## Traits
//!
//! ### Playback
//! - [`PlayerStateProvider`](player::PlayerStateProvider) - Running/transport state and current track of one player
//! - [`NotificationSink`](notify::NotificationSink) - Push now-playing/stop notifications to observers
//!
//! ### Metadata
//! - [`TagExtractor`](tags::TagExtractor) - Generic key/value tag extraction
//! - [`WaveInfoReader`](tags::WaveInfoReader) - Fixed-schema WAV tag reader
//!
//! ### Remote service
//! - [`ScrobbleService`](scrobble::ScrobbleService) - Now-playing updates and scrobble submission
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by service clients
//! - [`SecureStore`](storage::SecureStore) - Session key persistence
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Bridge traits return [`BridgeError`](error::BridgeError), except the scrobble
//! service which reports [`ServiceError`](scrobble::ServiceError) so callers can
//! tell authentication and rate-limit failures apart.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; every source loop holds them
//! behind `Arc`.

pub mod error;
pub mod http;
pub mod notify;
pub mod player;
pub mod scrobble;
pub mod storage;
pub mod tags;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use notify::{NotificationKind, NotificationSink, PlaybackNotification, TrackSummary};
pub use player::{NowPlaying, PlayerPoll, PlayerState, PlayerStateProvider, SourceId};
pub use scrobble::{ScrobbleAck, ScrobbleRequest, ScrobbleService, ServiceError, ServiceResult};
pub use storage::SecureStore;
pub use tags::{TagExtractor, TagMap, WaveInfo, WaveInfoReader};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};

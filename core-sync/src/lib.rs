//! # Scrobble Sync Module
//!
//! Delivers listens to Last.fm and reconciles the local ledger with it.
//!
//! ## Overview
//!
//! - Signing and sending Last.fm API calls, including session management
//! - Submitting live scrobbles while persisting every listen locally
//! - Catching up on listens the service never acknowledged
//!
//! ## Components
//!
//! - **Last.fm client** (`lastfm`): [`LastFmScrobbler`], an implementation of
//!   `bridge_traits::scrobble::ScrobbleService`
//! - **Scrobble sync** (`sync`): [`ScrobbleSync`], the live submit path and
//!   the catch-up pass over unsent records

pub mod error;
pub mod lastfm;
pub mod sync;

pub use error::{Result, SyncError};
pub use lastfm::{api_signature, LastFmScrobbler, LASTFM_API_BASE, SESSION_KEY_SECRET};
pub use sync::{request_from_record, CatchUpReport, ScrobbleOutcome, ScrobbleSync, SyncSettings};

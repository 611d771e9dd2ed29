//! # Scrobble Ledger
//!
//! Durable storage for completed listens and aggregate play counts.
//!
//! ## Overview
//!
//! - SQLite schema and migrations ([`db`])
//! - [`ScrobbleRecord`](models::ScrobbleRecord): one row per completed listen,
//!   `sent` flips to true once the remote service acknowledges it
//! - [`TrackPlayCount`](models::TrackPlayCount): per (artist, album, track)
//!   counter maintained with optimistic concurrency
//! - [`analysis`]: listening report and recommendations over both tables
//!
//! Every source loop shares one pool; the repositories are `Send + Sync` and
//! meant to live behind `Arc`.

pub mod analysis;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};

//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Pagination is supported via the `Page<T>` wrapper
//!
//! ## Available Repositories
//!
//! - `ScrobbleRecordRepository` - Completed listens and their delivery state
//! - `PlayCountRepository` - Per-track aggregate play counts

pub mod pagination;
pub mod play_count;
pub mod scrobble_record;

pub use pagination::{Page, PageRequest};
pub use play_count::{ConflictRetryPolicy, PlayCountRepository, SqlitePlayCountRepository};
pub use scrobble_record::{ScrobbleRecordRepository, SqliteScrobbleRecordRepository};

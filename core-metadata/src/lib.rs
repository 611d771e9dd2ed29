//! # Metadata Module
//!
//! Resolves the file behind a player-reported location into tag data.
//!
//! ## Overview
//!
//! This module handles:
//! - Normalizing `file://` URLs and filesystem paths, resolving symlinks
//! - Dispatching WAV files to the fixed-schema INFO reader and everything else
//!   to the generic key/value extractor
//! - Probing tag key variants and normalizing track numbers
//! - Caching resolved handles in a bounded LRU keyed by the raw location
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::{MetadataResolver, TagQuery, DEFAULT_CACHE_CAPACITY};
//!
//! let resolver = MetadataResolver::new(extractor, wave_reader, DEFAULT_CACHE_CAPACITY);
//! if let Some(tags) = resolver.resolve("file:///Music/Low/Words.flac").await {
//!     println!("{:?} track {}", tags.artist(), tags.track_number());
//! }
//! ```

pub mod error;
pub mod handle;
pub mod path;
pub mod resolver;
pub mod track_number;

pub use error::{MetadataError, Result};
pub use handle::{KeyedTags, MetadataHandle, TagQuery, WaveTags};
pub use path::{lexical_normalize, normalize, SourceFormat};
pub use resolver::{MetadataResolver, DEFAULT_CACHE_CAPACITY};
pub use track_number::parse_track_number;

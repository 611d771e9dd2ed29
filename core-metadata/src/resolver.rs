//! Metadata resolver with a bounded LRU cache.
//!
//! Keys are the raw strings the player reported, before normalization, so a
//! cache hit costs no filesystem access. Only successful resolutions are
//! cached; a failure is retried on the next lookup.

use bridge_traits::tags::{TagExtractor, WaveInfoReader};
use core_runtime::logging::strip_path;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::handle::MetadataHandle;
use crate::path::{normalize, SourceFormat};

/// Default number of cached handles.
pub const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Resolves track locations to tag handles, shared by every source loop.
pub struct MetadataResolver {
    cache: Mutex<LruCache<String, Arc<MetadataHandle>>>,
    extractor: Arc<dyn TagExtractor>,
    wave_reader: Arc<dyn WaveInfoReader>,
}

impl MetadataResolver {
    pub fn new(
        extractor: Arc<dyn TagExtractor>,
        wave_reader: Arc<dyn WaveInfoReader>,
        capacity: NonZeroUsize,
    ) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            extractor,
            wave_reader,
        }
    }

    /// Look up tags for `raw`, logging and swallowing any failure.
    ///
    /// `None` means "use the player-reported fields as they are".
    pub async fn resolve(&self, raw: &str) -> Option<Arc<MetadataHandle>> {
        if raw.trim().is_empty() {
            return None;
        }

        match self.try_resolve(raw).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(file = %strip_path(raw), error = %e, "Metadata resolution failed");
                None
            }
        }
    }

    /// Look up tags for `raw`, returning the failure to the caller.
    pub async fn try_resolve(&self, raw: &str) -> Result<Arc<MetadataHandle>> {
        if let Some(handle) = self.cache.lock().await.get(raw) {
            return Ok(Arc::clone(handle));
        }

        // Resolution can be slow (an external process); the lock is not held
        // across it, so two loops may resolve the same key concurrently.
        let handle = Arc::new(self.load(raw).await?);

        self.cache
            .lock()
            .await
            .put(raw.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    async fn load(&self, raw: &str) -> Result<MetadataHandle> {
        let path = normalize(raw).await?;
        debug!(file = %strip_path(raw), "Resolving metadata");

        let handle = match SourceFormat::classify(&path) {
            SourceFormat::Wave => MetadataHandle::from(self.wave_reader.read(&path).await?),
            SourceFormat::Generic => MetadataHandle::from(self.extractor.extract(&path).await?),
        };
        Ok(handle)
    }

    /// Whether `raw` is cached. Does not touch recency.
    pub async fn is_cached(&self, raw: &str) -> bool {
        self.cache.lock().await.contains(raw)
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn capacity(&self) -> usize {
        self.cache.lock().await.cap().get()
    }

    /// Drop a single entry, e.g. after the file was retagged.
    pub async fn invalidate(&self, raw: &str) -> bool {
        self.cache.lock().await.pop(raw).is_some()
    }
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver").finish_non_exhaustive()
    }
}

/// Convenience for call sites holding a `Path`.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

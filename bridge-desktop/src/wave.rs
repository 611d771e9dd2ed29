//! WAV tag reader using `lofty`.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    tags::{WaveInfo, WaveInfoReader},
};
use lofty::config::ParseOptions;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, TagType};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads the RIFF INFO chunk of WAV files. Falls back to an embedded ID3v2
/// tag when the file has no INFO chunk.
#[derive(Debug, Default, Clone)]
pub struct LoftyWaveReader;

impl LoftyWaveReader {
    pub fn new() -> Self {
        Self
    }

    fn read_blocking(path: &Path) -> Result<WaveInfo> {
        let tagged_file = Probe::open(path)
            .map_err(|e| BridgeError::OperationFailed(format!("open: {}", e)))?
            .options(ParseOptions::new())
            .read()
            .map_err(|e| BridgeError::OperationFailed(format!("parse: {}", e)))?;

        let Some(tag) = tagged_file
            .tag(TagType::RiffInfo)
            .or_else(|| tagged_file.primary_tag())
        else {
            debug!(path = %path.display(), "WAV file carries no tags");
            return Ok(WaveInfo::default());
        };

        let clean = |value: Option<String>| value.filter(|s| !s.trim().is_empty());

        Ok(WaveInfo {
            title: clean(tag.title().map(|s| s.trim().to_string())),
            artist: clean(tag.artist().map(|s| s.trim().to_string())),
            album: clean(tag.album().map(|s| s.trim().to_string())),
            track_number: clean(tag.get_string(&ItemKey::TrackNumber).map(str::to_string)),
        })
    }
}

#[async_trait]
impl WaveInfoReader for LoftyWaveReader {
    async fn read(&self, path: &Path) -> Result<WaveInfo> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::read_blocking(&path))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("tag reader task: {}", e)))?
    }
}

//! Resolved tag views.
//!
//! Two backends feed [`MetadataHandle`]: the fixed-schema WAV reader and the
//! generic key/value extractor. Both answer the same [`TagQuery`] questions.

use bridge_traits::tags::{TagMap, WaveInfo};
use serde_json::Value;

use crate::track_number::{parse_track_number, track_number_from_value};

const TITLE_KEYS: &[&str] = &["Title", "title"];
const ARTIST_KEYS: &[&str] = &["Artist", "artist"];
const ALBUM_ARTIST_KEYS: &[&str] = &["Albumartist", "AlbumArtist", "albumArtist"];
const TRACK_NUMBER_KEYS: &[&str] = &["TrackNumber", "Tracknumber", "tracknumber", "Track"];
const MUSICBRAINZ_TRACK_KEYS: &[&str] = &[
    "MusicbrainzTrackid",
    "MusicBrainzTrackId",
    "MusicBrainz Track Id",
];

/// Tag fields the scrobbler cares about. Empty strings mean absent.
pub trait TagQuery {
    fn title(&self) -> Option<&str>;
    fn artist(&self) -> Option<&str>;
    fn album_artist(&self) -> Option<&str>;
    /// 0 when unknown
    fn track_number(&self) -> i64;
    fn musicbrainz_track_id(&self) -> Option<&str>;
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Tags from a WAV file's INFO chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveTags(pub WaveInfo);

impl TagQuery for WaveTags {
    fn title(&self) -> Option<&str> {
        non_empty(self.0.title.as_deref())
    }

    fn artist(&self) -> Option<&str> {
        non_empty(self.0.artist.as_deref())
    }

    // INFO has no album-artist field.
    fn album_artist(&self) -> Option<&str> {
        self.artist()
    }

    fn track_number(&self) -> i64 {
        self.0
            .track_number
            .as_deref()
            .map(parse_track_number)
            .unwrap_or(0)
    }

    fn musicbrainz_track_id(&self) -> Option<&str> {
        None
    }
}

/// Tags from the generic extractor, looked up by key variant.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedTags(pub TagMap);

impl KeyedTags {
    /// First key in `keys` that is present and non-null.
    fn lookup(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    fn lookup_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(|value| non_empty(value.as_str()))
    }
}

impl TagQuery for KeyedTags {
    fn title(&self) -> Option<&str> {
        self.lookup_str(TITLE_KEYS)
    }

    fn artist(&self) -> Option<&str> {
        self.lookup_str(ARTIST_KEYS)
    }

    fn album_artist(&self) -> Option<&str> {
        self.lookup_str(ALBUM_ARTIST_KEYS)
    }

    fn track_number(&self) -> i64 {
        self.lookup(TRACK_NUMBER_KEYS)
            .map(track_number_from_value)
            .unwrap_or(0)
    }

    fn musicbrainz_track_id(&self) -> Option<&str> {
        self.lookup_str(MUSICBRAINZ_TRACK_KEYS)
    }
}

/// A resolved tag view, whichever backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataHandle {
    Wave(WaveTags),
    Keyed(KeyedTags),
}

impl MetadataHandle {
    fn inner(&self) -> &dyn TagQuery {
        match self {
            MetadataHandle::Wave(tags) => tags,
            MetadataHandle::Keyed(tags) => tags,
        }
    }
}

impl From<WaveInfo> for MetadataHandle {
    fn from(info: WaveInfo) -> Self {
        MetadataHandle::Wave(WaveTags(info))
    }
}

impl From<TagMap> for MetadataHandle {
    fn from(map: TagMap) -> Self {
        MetadataHandle::Keyed(KeyedTags(map))
    }
}

impl TagQuery for MetadataHandle {
    fn title(&self) -> Option<&str> {
        self.inner().title()
    }

    fn artist(&self) -> Option<&str> {
        self.inner().artist()
    }

    fn album_artist(&self) -> Option<&str> {
        self.inner().album_artist()
    }

    fn track_number(&self) -> i64 {
        self.inner().track_number()
    }

    fn musicbrainz_track_id(&self) -> Option<&str> {
        self.inner().musicbrainz_track_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyed(value: Value) -> MetadataHandle {
        match value {
            Value::Object(map) => MetadataHandle::from(map),
            _ => unreachable!("test fixtures are objects"),
        }
    }

    #[test]
    fn test_keyed_lookup_tries_variants_in_order() {
        let handle = keyed(json!({
            "artist": "lowercase wins only as fallback",
            "Artist": "Slowdive",
            "albumArtist": "third",
            "AlbumArtist": "Slowdive",
            "Tracknumber": "4 of 7",
            "MusicBrainzTrackId": "0b4c8d9e-1111-2222-3333-444455556666",
        }));

        assert_eq!(handle.artist(), Some("Slowdive"));
        assert_eq!(handle.album_artist(), Some("Slowdive"));
        assert_eq!(handle.track_number(), 4);
        assert_eq!(
            handle.musicbrainz_track_id(),
            Some("0b4c8d9e-1111-2222-3333-444455556666")
        );
        assert_eq!(handle.title(), None);
    }

    #[test]
    fn test_keyed_skips_empty_values() {
        let handle = keyed(json!({ "Albumartist": "", "AlbumArtist": "Low" }));
        assert_eq!(handle.album_artist(), Some("Low"));
    }

    #[test]
    fn test_keyed_numeric_track() {
        let handle = keyed(json!({ "TrackNumber": 12 }));
        assert_eq!(handle.track_number(), 12);
    }

    #[test]
    fn test_wave_handle() {
        let handle = MetadataHandle::from(WaveInfo {
            title: Some("Alison".into()),
            artist: Some("Slowdive".into()),
            album: Some("Souvlaki".into()),
            track_number: Some("1/10".into()),
        });

        assert_eq!(handle.title(), Some("Alison"));
        assert_eq!(handle.album_artist(), Some("Slowdive"));
        assert_eq!(handle.track_number(), 1);
        assert_eq!(handle.musicbrainz_track_id(), None);
    }
}

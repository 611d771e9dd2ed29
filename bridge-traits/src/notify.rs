//! Notification sink for observers of playback state.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::player::SourceId;

/// Notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NowPlaying,
    Stop,
}

/// Track fields carried by a notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackSummary {
    pub title: String,
    pub album: String,
    pub artist: String,
}

/// Playback notification, serialized as
/// `{"type":"now_playing","source":"roon","data":{"title":..,"album":..,"artist":..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub source: SourceId,
    pub data: TrackSummary,
}

impl PlaybackNotification {
    pub fn now_playing(source: SourceId, data: TrackSummary) -> Self {
        Self {
            kind: NotificationKind::NowPlaying,
            source,
            data,
        }
    }

    pub fn stop(source: SourceId) -> Self {
        Self {
            kind: NotificationKind::Stop,
            source,
            data: TrackSummary::default(),
        }
    }
}

/// Fire-and-forget notification sink
///
/// Must not block. Callers log a returned error and move on.
pub trait NotificationSink: Send + Sync {
    fn broadcast(&self, notification: PlaybackNotification) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_shape() {
        let notification = PlaybackNotification::now_playing(
            SourceId::from("roon"),
            TrackSummary {
                title: "Windowlicker".into(),
                album: "Windowlicker".into(),
                artist: "Aphex Twin".into(),
            },
        );

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "now_playing");
        assert_eq!(value["source"], "roon");
        assert_eq!(value["data"]["artist"], "Aphex Twin");

        let stop = serde_json::to_value(PlaybackNotification::stop("roon".into())).unwrap();
        assert_eq!(stop["type"], "stop");
    }
}

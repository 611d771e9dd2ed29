//! Player State Provider
//!
//! One provider per player source. The core polls it every tick and never
//! talks to the player application directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BridgeError, Result};

/// Stable name of a player source, e.g. `audirvana` or `roon`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Transport state reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

/// What the player says it is playing right now.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: f64,
    pub position_secs: f64,
    /// File path or URL of the track. Empty when the player does not expose one.
    pub url: String,
}

/// Result of one provider poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerPoll {
    /// The player application is not running.
    NotRunning,
    /// Running but not playing (stopped or paused).
    NotPlaying(PlayerState),
    /// Actively playing.
    Playing(NowPlaying),
}

/// Player-state provider trait
///
/// Implementations map their own failures onto [`BridgeError`]; a player that
/// cannot be reached should report `Ok(false)` from `is_running`.
///
/// Providers whose backend answers all three questions in one call should
/// override [`poll`](PlayerStateProvider::poll).
#[async_trait]
pub trait PlayerStateProvider: Send + Sync {
    /// Whether the player application is running.
    async fn is_running(&self) -> Result<bool>;

    /// Current transport state.
    async fn state(&self) -> Result<PlayerState>;

    /// Current track, or `None` if the player reports nothing.
    async fn now_playing(&self) -> Result<Option<NowPlaying>>;

    /// Query running state, transport state and track in order.
    ///
    /// A player that claims to be playing but reports no track is treated as
    /// a failed poll.
    async fn poll(&self) -> Result<PlayerPoll> {
        if !self.is_running().await? {
            return Ok(PlayerPoll::NotRunning);
        }

        match self.state().await? {
            PlayerState::Playing => match self.now_playing().await? {
                Some(track) => Ok(PlayerPoll::Playing(track)),
                None => Err(BridgeError::OperationFailed(
                    "player is playing but reported no track".to_string(),
                )),
            },
            other => Ok(PlayerPoll::NotPlaying(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Provider {}

        #[async_trait]
        impl PlayerStateProvider for Provider {
            async fn is_running(&self) -> Result<bool>;
            async fn state(&self) -> Result<PlayerState>;
            async fn now_playing(&self) -> Result<Option<NowPlaying>>;
        }
    }

    #[tokio::test]
    async fn test_poll_short_circuits_when_not_running() {
        let mut provider = MockProvider::new();
        provider.expect_is_running().returning(|| Ok(false));
        provider.expect_state().never();
        provider.expect_now_playing().never();

        assert_eq!(provider.poll().await.unwrap(), PlayerPoll::NotRunning);
    }

    #[tokio::test]
    async fn test_poll_reports_paused() {
        let mut provider = MockProvider::new();
        provider.expect_is_running().returning(|| Ok(true));
        provider
            .expect_state()
            .returning(|| Ok(PlayerState::Paused));
        provider.expect_now_playing().never();

        assert_eq!(
            provider.poll().await.unwrap(),
            PlayerPoll::NotPlaying(PlayerState::Paused)
        );
    }

    #[tokio::test]
    async fn test_poll_playing_without_track_is_error() {
        let mut provider = MockProvider::new();
        provider.expect_is_running().returning(|| Ok(true));
        provider
            .expect_state()
            .returning(|| Ok(PlayerState::Playing));
        provider.expect_now_playing().returning(|| Ok(None));

        assert!(provider.poll().await.is_err());
    }

    #[test]
    fn test_source_id_display() {
        let id = SourceId::from("audirvana");
        assert_eq!(id.to_string(), "audirvana");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"audirvana\"");
    }
}

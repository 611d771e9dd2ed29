//! Roon provider backed by `nowplaying-cli`.
//!
//! Roon exposes no scripting interface, so the provider reads the system
//! now-playing center and only trusts it while Roon owns the session.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    player::{NowPlaying, PlayerPoll, PlayerState, PlayerStateProvider},
};
use std::time::Duration;

use crate::command::{run_command, DEFAULT_COMMAND_TIMEOUT};

const ROON_BUNDLE_ID: &str = "com.roon.Roon";
const FIELDS: [&str; 7] = [
    "bundleIdentifier",
    "playbackRate",
    "title",
    "artist",
    "album",
    "duration",
    "elapsedTime",
];

/// Parsed `nowplaying-cli get` output.
#[derive(Debug, Clone, PartialEq)]
struct MediaSnapshot {
    bundle_id: String,
    playback_rate: f64,
    track: NowPlaying,
}

/// Player-state provider for Roon (macOS).
pub struct RoonProvider {
    program: String,
    timeout: Duration,
}

impl RoonProvider {
    pub fn new() -> Self {
        Self {
            program: "nowplaying-cli".to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a differently named `nowplaying-cli` binary
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn snapshot(&self) -> Result<MediaSnapshot> {
        let mut args = vec!["get"];
        args.extend_from_slice(&FIELDS);
        let output = run_command(&self.program, &args, self.timeout).await?;
        parse_snapshot(&output)
    }
}

impl Default for RoonProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerStateProvider for RoonProvider {
    async fn is_running(&self) -> Result<bool> {
        Ok(self.snapshot().await?.bundle_id == ROON_BUNDLE_ID)
    }

    async fn state(&self) -> Result<PlayerState> {
        let snapshot = self.snapshot().await?;
        Ok(if snapshot.playback_rate > 0.0 {
            PlayerState::Playing
        } else {
            PlayerState::Paused
        })
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>> {
        let snapshot = self.snapshot().await?;
        Ok((snapshot.bundle_id == ROON_BUNDLE_ID).then_some(snapshot.track))
    }

    async fn poll(&self) -> Result<PlayerPoll> {
        let snapshot = self.snapshot().await?;

        if snapshot.bundle_id != ROON_BUNDLE_ID {
            return Ok(PlayerPoll::NotRunning);
        }
        if snapshot.playback_rate <= 0.0 {
            return Ok(PlayerPoll::NotPlaying(PlayerState::Paused));
        }
        Ok(PlayerPoll::Playing(snapshot.track))
    }
}

fn parse_snapshot(raw: &str) -> Result<MediaSnapshot> {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    if lines.len() < FIELDS.len() {
        return Err(BridgeError::Malformed {
            source_name: "nowplaying-cli".to_string(),
            message: format!("expected {} lines, got {}", FIELDS.len(), lines.len()),
        });
    }

    let text = |i: usize| -> String {
        match lines[i] {
            "null" | "(null)" => String::new(),
            value => value.to_string(),
        }
    };
    let number = |i: usize| -> f64 { lines[i].parse::<f64>().unwrap_or(0.0) };

    // Roon reports every credited artist, comma separated.
    let artists = text(3);
    let artist = artists
        .split(',')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    Ok(MediaSnapshot {
        bundle_id: text(0),
        playback_rate: number(1),
        track: NowPlaying {
            title: text(2),
            artist,
            album: text(4),
            duration_secs: number(5),
            position_secs: number(6),
            url: String::new(),
        },
    })
}

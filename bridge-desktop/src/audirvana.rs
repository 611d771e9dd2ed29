//! Audirvana Origin provider driven through AppleScript.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    player::{NowPlaying, PlayerState, PlayerStateProvider},
};
use std::time::Duration;
use tracing::debug;

use crate::command::{run_command, DEFAULT_COMMAND_TIMEOUT};

const APP_NAME: &str = "Audirvana Origin";
const FIELD_SEPARATOR: char = '|';

const NOW_PLAYING_SCRIPT: &str = r#"set playingTrack to playing track title
set playingAlbum to playing track album
set playingArtist to playing track artist
set playingDuration to (playing track duration) as string
set playingPosition to (player position) as string
set playingUrl to playing track url
return playingTrack & "|" & playingAlbum & "|" & playingArtist & "|" & playingDuration & "|" & playingPosition & "|" & playingUrl"#;

/// Player-state provider for Audirvana Origin (macOS).
pub struct AudirvanaProvider {
    app_name: String,
    timeout: Duration,
}

impl AudirvanaProvider {
    pub fn new() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the per-script timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn tell(&self, application: &str, body: &str) -> Result<String> {
        let script = format!("tell application \"{}\"\n{}\nend tell", application, body);
        run_command("osascript", &["-e", &script], self.timeout).await
    }
}

impl Default for AudirvanaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerStateProvider for AudirvanaProvider {
    async fn is_running(&self) -> Result<bool> {
        let body = format!(
            "return (name of every application process) contains \"{}\"",
            self.app_name
        );
        let output = self.tell("System Events", &body).await?;
        Ok(output.trim().eq_ignore_ascii_case("true"))
    }

    async fn state(&self) -> Result<PlayerState> {
        let output = self.tell(&self.app_name, "return player state").await?;
        parse_player_state(&output)
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>> {
        let output = self.tell(&self.app_name, NOW_PLAYING_SCRIPT).await?;
        let track = parse_now_playing(&output)?;
        debug!(title = %track.title, position = track.position_secs, "Audirvana now playing");
        Ok(Some(track))
    }
}

fn parse_player_state(raw: &str) -> Result<PlayerState> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "playing" => Ok(PlayerState::Playing),
        "paused" => Ok(PlayerState::Paused),
        "stopped" => Ok(PlayerState::Stopped),
        other => Err(malformed(format!("unknown player state {:?}", other))),
    }
}

/// Parses `title|album|artist|duration|position|url`.
fn parse_now_playing(raw: &str) -> Result<NowPlaying> {
    let fields: Vec<&str> = raw.splitn(6, FIELD_SEPARATOR).collect();
    if fields.len() < 6 {
        return Err(malformed(format!("expected 6 fields, got {}", fields.len())));
    }

    let duration_secs = parse_seconds(fields[3], "duration")?;
    let position_secs = parse_seconds(fields[4], "position")?;
    let url = urlencoding::decode(fields[5].trim())
        .map_err(|e| malformed(format!("track url: {}", e)))?
        .into_owned();

    Ok(NowPlaying {
        title: fields[0].trim().to_string(),
        album: fields[1].trim().to_string(),
        artist: fields[2].trim().to_string(),
        duration_secs,
        position_secs,
        url,
    })
}

fn parse_seconds(raw: &str, field: &str) -> Result<f64> {
    // AppleScript may format reals with a locale decimal comma.
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|e| malformed(format!("{} {:?}: {}", field, raw, e)))
}

fn malformed(message: String) -> BridgeError {
    BridgeError::Malformed {
        source_name: APP_NAME.to_string(),
        message,
    }
}

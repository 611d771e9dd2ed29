//! Last.fm Scrobble API Client
//!
//! Implements [`ScrobbleService`] against the Last.fm 2.0 API.
//!
//! ## API Endpoints
//!
//! All calls are signed `POST`s to `https://ws.audioscrobbler.com/2.0/` with
//! `format=json`:
//!
//! - `auth.getMobileSession` - exchange username/password for a session key
//! - `track.updateNowPlaying` - transient "now playing" status
//! - `track.scrobble` - a completed listen
//!
//! ## Signatures
//!
//! `api_sig` is the md5 hex digest of every parameter except `format`, sorted
//! by name and concatenated as `name` + `value`, followed by the shared secret.
//!
//! ## Sessions
//!
//! A configured session key is used as-is. Otherwise the client authenticates
//! once with username/password, keeps the key in memory and persists it to
//! the [`SecureStore`] so later runs skip the login. An "invalid session"
//! error (code 9) drops the cached key; the call is retried once with a fresh
//! session when credentials allow it.
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::lastfm::LastFmScrobbler;
//!
//! let scrobbler = LastFmScrobbler::new(http_client, config.lastfm.clone())
//!     .with_secure_store(secure_store);
//! let ack = scrobbler.submit_scrobble(&request).await?;
//! ```

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::scrobble::{ScrobbleAck, ScrobbleRequest, ScrobbleService, ServiceResult};
use bridge_traits::storage::SecureStore;
use core_runtime::config::LastFmConfig;
use md5::{Digest, Md5};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Last.fm API base URL
pub const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

/// Secure-store key under which an obtained session key is persisted
pub const SESSION_KEY_SECRET: &str = "lastfm.session_key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ERROR_INVALID_SESSION: i64 = 9;
const ERROR_RATE_LIMITED: i64 = 29;
const AUTH_ERRORS: &[i64] = &[4, 10, 14, 15, 26];

/// Last.fm error body: `{"error": 9, "message": "Invalid session key"}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session: SessionInfo,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(default)]
    name: String,
    key: String,
}

/// Compute `api_sig` for a parameter set.
///
/// `format` and `callback` never take part in the signature.
pub fn api_signature(params: &BTreeMap<String, String>, shared_secret: &str) -> String {
    let mut hasher = Md5::new();
    for (name, value) in params {
        if name == "format" || name == "callback" {
            continue;
        }
        hasher.update(name.as_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.update(shared_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Track parameters shared by now-playing and scrobble calls. Empty optional
/// fields are omitted.
fn track_params(request: &ScrobbleRequest) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("artist".to_string(), request.artist.clone());
    params.insert("track".to_string(), request.track.clone());

    if !request.album.is_empty() {
        params.insert("album".to_string(), request.album.clone());
    }
    if !request.album_artist.is_empty() {
        params.insert("albumArtist".to_string(), request.album_artist.clone());
    }
    if request.duration_secs > 0 {
        params.insert("duration".to_string(), request.duration_secs.to_string());
    }
    if let Some(number) = request.track_number.filter(|n| *n > 0) {
        params.insert("trackNumber".to_string(), number.to_string());
    }
    if let Some(mbid) = request.musicbrainz_id.as_deref().filter(|m| !m.is_empty()) {
        params.insert("mbid".to_string(), mbid.to_string());
    }
    params
}

fn map_api_error(error: ErrorResponse) -> SyncError {
    match error.error {
        ERROR_RATE_LIMITED => SyncError::RateLimited,
        code if code == ERROR_INVALID_SESSION || AUTH_ERRORS.contains(&code) => {
            SyncError::Auth(error.message)
        }
        code => SyncError::Remote {
            code,
            message: error.message,
        },
    }
}

/// Accept both `1` and `"1"`; Last.fm has returned either over the years.
fn lenient_u32(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0).min(u64::from(u32::MAX)) as u32,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn parse_ack(body: &Value) -> Result<ScrobbleAck> {
    let attr = body
        .get("scrobbles")
        .and_then(|s| s.get("@attr"))
        .ok_or_else(|| SyncError::Protocol("scrobble response without scrobbles.@attr".into()))?;

    Ok(ScrobbleAck {
        accepted: lenient_u32(attr.get("accepted")),
        ignored: lenient_u32(attr.get("ignored")),
    })
}

/// Last.fm implementation of [`ScrobbleService`]
pub struct LastFmScrobbler {
    http_client: Arc<dyn HttpClient>,
    secure_store: Option<Arc<dyn SecureStore>>,
    config: LastFmConfig,
    endpoint: String,
    session: Mutex<Option<String>>,
}

impl LastFmScrobbler {
    pub fn new(http_client: Arc<dyn HttpClient>, config: LastFmConfig) -> Self {
        let session = config.session_key.clone().filter(|k| !k.is_empty());
        Self {
            http_client,
            secure_store: None,
            config,
            endpoint: LASTFM_API_BASE.to_string(),
            session: Mutex::new(session),
        }
    }

    /// Persist obtained session keys through `store`.
    pub fn with_secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Point at a different API root (proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Current session key, authenticating if none is known yet.
    pub async fn session_key(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(key) = session.as_ref() {
            return Ok(key.clone());
        }

        if let Some(key) = self.load_stored_session().await {
            debug!("Using stored Last.fm session");
            *session = Some(key.clone());
            return Ok(key);
        }

        let key = self.authenticate().await?;
        *session = Some(key.clone());
        Ok(key)
    }

    async fn load_stored_session(&self) -> Option<String> {
        let store = self.secure_store.as_ref()?;
        match store.get_secret(SESSION_KEY_SECRET).await {
            Ok(Some(bytes)) => String::from_utf8(bytes).ok().filter(|k| !k.is_empty()),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored Last.fm session");
                None
            }
        }
    }

    /// Obtain a session key with `auth.getMobileSession`.
    #[instrument(skip(self))]
    async fn authenticate(&self) -> Result<String> {
        let (Some(username), Some(password)) = (
            self.config.username.as_deref().filter(|u| !u.is_empty()),
            self.config.password.as_deref().filter(|p| !p.is_empty()),
        ) else {
            return Err(SyncError::Auth(
                "No session key and no username/password configured".to_string(),
            ));
        };

        let mut params = BTreeMap::new();
        params.insert("username".to_string(), username.to_string());
        params.insert("password".to_string(), password.to_string());

        let body = self.call("auth.getMobileSession", params, None).await?;
        let response: SessionResponse = serde_json::from_value(body)
            .map_err(|e| SyncError::Protocol(format!("Invalid session response: {}", e)))?;

        info!(user = %response.session.name, "Obtained Last.fm session");

        if let Some(store) = &self.secure_store {
            if let Err(e) = store
                .set_secret(SESSION_KEY_SECRET, response.session.key.as_bytes())
                .await
            {
                warn!(error = %e, "Failed to persist Last.fm session");
            }
        }

        Ok(response.session.key)
    }

    /// Forget the cached session everywhere.
    pub async fn invalidate_session(&self) {
        *self.session.lock().await = None;
        if let Some(store) = &self.secure_store {
            if let Err(e) = store.delete_secret(SESSION_KEY_SECRET).await {
                warn!(error = %e, "Failed to delete stored Last.fm session");
            }
        }
    }

    /// Sign and send one API call, returning the JSON body.
    async fn call(
        &self,
        method: &str,
        mut params: BTreeMap<String, String>,
        session_key: Option<&str>,
    ) -> Result<Value> {
        params.insert("method".to_string(), method.to_string());
        params.insert("api_key".to_string(), self.config.api_key.clone());
        if let Some(sk) = session_key {
            params.insert("sk".to_string(), sk.to_string());
        }

        let signature = api_signature(&params, &self.config.shared_secret);
        params.insert("api_sig".to_string(), signature);
        params.insert("format".to_string(), "json".to_string());

        let request = HttpRequest::new(HttpMethod::Post, self.endpoint.clone())
            .header("Accept", "application/json")
            .form(&params)
            .timeout(REQUEST_TIMEOUT);

        debug!(method, "Calling Last.fm");
        let response = self.http_client.execute(request).await?;

        // API errors come back as JSON with 4xx status codes too.
        if let Ok(error) = serde_json::from_slice::<ErrorResponse>(&response.body) {
            if error.error == ERROR_INVALID_SESSION && session_key.is_some() {
                warn!("Last.fm rejected the session key");
                self.invalidate_session().await;
            }
            return Err(map_api_error(error));
        }

        if !response.is_success() {
            if response.status == 429 {
                return Err(SyncError::RateLimited);
            }
            return Err(SyncError::Http {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Protocol(format!("Invalid JSON from Last.fm: {}", e)))
    }

    /// Authenticated call, retried once after re-authenticating when the
    /// session turned out to be invalid.
    async fn authenticated_call(
        &self,
        method: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Value> {
        let session_key = self.session_key().await?;
        match self.call(method, params.clone(), Some(&session_key)).await {
            Err(SyncError::Auth(message)) if self.config.has_user_credentials() => {
                // Only an evicted session is worth a second attempt.
                if self.session.lock().await.is_some() {
                    return Err(SyncError::Auth(message));
                }
                let fresh = self.session_key().await?;
                self.call(method, params, Some(&fresh)).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl ScrobbleService for LastFmScrobbler {
    #[instrument(skip(self, request), fields(track = %request.track, artist = %request.artist))]
    async fn update_now_playing(&self, request: &ScrobbleRequest) -> ServiceResult<()> {
        self.authenticated_call("track.updateNowPlaying", track_params(request))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(track = %request.track, artist = %request.artist))]
    async fn submit_scrobble(&self, request: &ScrobbleRequest) -> ServiceResult<ScrobbleAck> {
        let mut params = track_params(request);
        params.insert("timestamp".to_string(), request.timestamp.to_string());

        let body = self.authenticated_call("track.scrobble", params).await?;
        Ok(parse_ack(&body)?)
    }
}

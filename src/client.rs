use std::{fmt, path::PathBuf, time::Duration};

use reqwest::{blocking::RequestBuilder, header::CONTENT_LENGTH, Method, StatusCode};
use serde::Deserialize;

use crate::{
    auth::SpotifyAuth,
    error::ApiError,
    playback::{PlaybackSnapshot, RepeatMode},
};

const API_BASE: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The playback service as the island sees it. Every call blocks and may
/// fail with any [`ApiError`].
pub trait PlaybackApi: Send + Sync {
    /// `Ok(None)` when nothing is playing on any device.
    fn get_playback(&self) -> Result<Option<PlaybackSnapshot>, ApiError>;
    fn play(&self) -> Result<(), ApiError>;
    fn pause(&self) -> Result<(), ApiError>;
    fn next(&self) -> Result<(), ApiError>;
    fn previous(&self) -> Result<(), ApiError>;
    fn set_shuffle(&self, enabled: bool) -> Result<(), ApiError>;
    fn set_repeat(&self, mode: RepeatMode) -> Result<(), ApiError>;
    fn seek(&self, position_ms: u64) -> Result<(), ApiError>;
    fn set_volume(&self, percent: u8) -> Result<(), ApiError>;
    fn is_liked(&self, track_id: &str) -> Result<bool, ApiError>;
    fn add_liked(&self, track_id: &str) -> Result<(), ApiError>;
    fn remove_liked(&self, track_id: &str) -> Result<(), ApiError>;
    /// Rebuild credentials after an [`ApiError::AuthExpired`].
    fn reauthenticate(&self) -> Result<(), ApiError>;
}

/// A fire-and-forget request against the playback service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Next,
    Previous,
    SetShuffle(bool),
    SetRepeat(RepeatMode),
    Seek(u64),
    SetVolume(u8),
    AddLiked(String),
    RemoveLiked(String),
}

impl PlaybackCommand {
    pub fn execute(&self, api: &dyn PlaybackApi) -> Result<(), ApiError> {
        match self {
            PlaybackCommand::Play => api.play(),
            PlaybackCommand::Pause => api.pause(),
            PlaybackCommand::Next => api.next(),
            PlaybackCommand::Previous => api.previous(),
            PlaybackCommand::SetShuffle(enabled) => api.set_shuffle(*enabled),
            PlaybackCommand::SetRepeat(mode) => api.set_repeat(*mode),
            PlaybackCommand::Seek(position_ms) => api.seek(*position_ms),
            PlaybackCommand::SetVolume(percent) => api.set_volume(*percent),
            PlaybackCommand::AddLiked(track_id) => api.add_liked(track_id),
            PlaybackCommand::RemoveLiked(track_id) => api.remove_liked(track_id),
        }
    }
}

impl fmt::Display for PlaybackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackCommand::Play => write!(f, "play"),
            PlaybackCommand::Pause => write!(f, "pause"),
            PlaybackCommand::Next => write!(f, "next"),
            PlaybackCommand::Previous => write!(f, "previous"),
            PlaybackCommand::SetShuffle(enabled) => write!(f, "shuffle({enabled})"),
            PlaybackCommand::SetRepeat(mode) => write!(f, "repeat({mode})"),
            PlaybackCommand::Seek(position_ms) => write!(f, "seek({position_ms})"),
            PlaybackCommand::SetVolume(percent) => write!(f, "volume({percent})"),
            PlaybackCommand::AddLiked(id) => write!(f, "like({id})"),
            PlaybackCommand::RemoveLiked(id) => write!(f, "unlike({id})"),
        }
    }
}

#[derive(Deserialize)]
struct PlayerJson {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    shuffle_state: bool,
    #[serde(default)]
    repeat_state: RepeatMode,
    #[serde(default)]
    device: Option<DeviceJson>,
    #[serde(default)]
    item: Option<ItemJson>,
}

#[derive(Deserialize)]
struct DeviceJson {
    #[serde(default)]
    volume_percent: Option<u8>,
}

#[derive(Deserialize)]
struct ItemJson {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<ArtistJson>,
    #[serde(default)]
    album: Option<AlbumJson>,
}

#[derive(Deserialize)]
struct ArtistJson {
    name: String,
}

#[derive(Deserialize)]
struct AlbumJson {
    #[serde(default)]
    images: Vec<ImageJson>,
}

#[derive(Deserialize)]
struct ImageJson {
    url: String,
}

impl PlayerJson {
    fn into_snapshot(self) -> Option<PlaybackSnapshot> {
        let item = self.item?;
        // Local files have no id, only a uri.
        let track_id = item.id.or(item.uri)?;
        Some(PlaybackSnapshot {
            track_id,
            track_name: item.name,
            artist_name: item
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_default(),
            album_art_urls: item
                .album
                .map(|album| album.images.into_iter().map(|i| i.url).collect())
                .unwrap_or_default(),
            is_playing: self.is_playing,
            progress_ms: self.progress_ms.unwrap_or(0),
            duration_ms: item.duration_ms,
            shuffle_enabled: self.shuffle_state,
            repeat_mode: self.repeat_state,
            device_volume_percent: self.device.and_then(|d| d.volume_percent),
        })
    }
}

/// Parse a `GET /me/player` body.
pub fn parse_playback(body: &str) -> Result<Option<PlaybackSnapshot>, ApiError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let player: PlayerJson = serde_json::from_str(body)
        .map_err(|e| ApiError::Transient(format!("malformed playback state: {e}")))?;
    Ok(player.into_snapshot())
}

#[derive(Clone, Debug)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub token_cache: PathBuf,
}

/// [`PlaybackApi`] over the Spotify Web API.
pub struct SpotifyClient {
    http: reqwest::blocking::Client,
    auth: SpotifyAuth,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(credentials: SpotifyCredentials) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let auth = SpotifyAuth::new(
            credentials.client_id,
            credentials.client_secret,
            credentials.token_cache,
            http.clone(),
        );
        Ok(Self {
            http,
            auth,
            api_base: API_BASE.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.auth.access_token()?;
        let url = format!("{}{}", self.api_base, path);
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    fn send(&self, request: RequestBuilder) -> Result<reqwest::blocking::Response, ApiError> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), &body))
    }

    fn command(&self, method: Method, path: &str) -> Result<(), ApiError> {
        // Spotify rejects body-less PUT/POST without an explicit length.
        let request = self.request(method, path)?.header(CONTENT_LENGTH, 0);
        self.send(request).map(|_| ())
    }
}

impl PlaybackApi for SpotifyClient {
    fn get_playback(&self) -> Result<Option<PlaybackSnapshot>, ApiError> {
        let response = self.send(self.request(Method::GET, "/me/player")?)?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text()?;
        parse_playback(&body)
    }

    fn play(&self) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/play")
    }

    fn pause(&self) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/pause")
    }

    fn next(&self) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/next")
    }

    fn previous(&self) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/previous")
    }

    fn set_shuffle(&self, enabled: bool) -> Result<(), ApiError> {
        self.command(Method::PUT, &format!("/me/player/shuffle?state={enabled}"))
    }

    fn set_repeat(&self, mode: RepeatMode) -> Result<(), ApiError> {
        self.command(Method::PUT, &format!("/me/player/repeat?state={mode}"))
    }

    fn seek(&self, position_ms: u64) -> Result<(), ApiError> {
        self.command(
            Method::PUT,
            &format!("/me/player/seek?position_ms={position_ms}"),
        )
    }

    fn set_volume(&self, percent: u8) -> Result<(), ApiError> {
        self.command(
            Method::PUT,
            &format!("/me/player/volume?volume_percent={}", percent.min(100)),
        )
    }

    fn is_liked(&self, track_id: &str) -> Result<bool, ApiError> {
        let request = self.request(Method::GET, &format!("/me/tracks/contains?ids={track_id}"))?;
        let flags: Vec<bool> = self
            .send(request)?
            .json()
            .map_err(|e| ApiError::Transient(format!("malformed library response: {e}")))?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    fn add_liked(&self, track_id: &str) -> Result<(), ApiError> {
        self.command(Method::PUT, &format!("/me/tracks?ids={track_id}"))
    }

    fn remove_liked(&self, track_id: &str) -> Result<(), ApiError> {
        self.command(Method::DELETE, &format!("/me/tracks?ids={track_id}"))
    }

    fn reauthenticate(&self) -> Result<(), ApiError> {
        self.auth.reauthenticate()
    }
}

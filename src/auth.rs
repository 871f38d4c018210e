use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
/// Refresh this many seconds before the token actually expires.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// On-disk token cache in the layout spotipy writes, so an existing
/// `.spotify_cache` keeps working.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_at: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl CachedToken {
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expires_at <= now_secs + EXPIRY_MARGIN_SECS
    }

    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let data = fs::read_to_string(path).map_err(|e| {
            ApiError::AuthExpired(format!(
                "no usable token cache at {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            ApiError::AuthExpired(format!("corrupt token cache {}: {e}", path.display()))
        })
    }

    pub fn store(&self, path: &Path) -> std::io::Result<()> {
        let data = serde_json::to_string(self)?;
        fs::write(path, data)
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: u64,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Token owner for the Spotify client. Reads the cache written by whatever
/// performed the authorization, renews it with the refresh token and writes
/// renewals back.
pub struct SpotifyAuth {
    client_id: String,
    client_secret: Option<String>,
    cache_path: PathBuf,
    http: reqwest::blocking::Client,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyAuth {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        cache_path: impl Into<PathBuf>,
        http: reqwest::blocking::Client,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            cache_path: cache_path.into(),
            http,
            token: Mutex::new(None),
        }
    }

    /// A bearer token valid for at least the expiry margin.
    pub fn access_token(&self) -> Result<String, ApiError> {
        let mut guard = self.token.lock();
        let token = match guard.take() {
            Some(token) => token,
            None => CachedToken::load(&self.cache_path)?,
        };
        let token = if token.is_expired_at(now_secs()) {
            self.refresh(&token)?
        } else {
            token
        };
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    /// Forget the in-memory token, re-read the cache and force a refresh.
    pub fn reauthenticate(&self) -> Result<(), ApiError> {
        let mut guard = self.token.lock();
        *guard = None;
        let cached = CachedToken::load(&self.cache_path)?;
        let renewed = self.refresh(&cached)?;
        *guard = Some(renewed);
        log::info!("Spotify token renewed");
        Ok(())
    }

    fn refresh(&self, current: &CachedToken) -> Result<CachedToken, ApiError> {
        let refresh_token = current.refresh_token.as_deref().ok_or_else(|| {
            ApiError::AuthExpired("token expired and no refresh token is cached".into())
        })?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let mut request = self.http.post(TOKEN_URL);
        match self.client_secret.as_deref() {
            Some(secret) => request = request.basic_auth(&self.client_id, Some(secret)),
            None => form.push(("client_id", self.client_id.as_str())),
        }

        let response = request.form(&form).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 => ApiError::AuthExpired(format!("token refresh rejected: {body}")),
                code => ApiError::from_status(code, &body),
            });
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|e| ApiError::Transient(format!("bad token response: {e}")))?;
        let renewed = CachedToken {
            access_token: body.access_token,
            token_type: body.token_type,
            expires_in: body.expires_in,
            scope: body.scope.or_else(|| current.scope.clone()),
            expires_at: now_secs() + body.expires_in,
            refresh_token: body
                .refresh_token
                .or_else(|| current.refresh_token.clone()),
        };

        if let Err(err) = renewed.store(&self.cache_path) {
            log::warn!(
                "Failed to write token cache {}: {err}",
                self.cache_path.display()
            );
        }
        Ok(renewed)
    }
}

use anyhow::Context;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    cache::DEFAULT_CAPACITY,
    color::AccentColor,
    debounce::DEFAULT_QUIET_PERIOD,
    poller::{DEFAULT_FAST_INTERVAL, DEFAULT_SLOW_INTERVAL},
    workers::DEFAULT_MAX_INFLIGHT,
};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub polling: PollingConfig,
    pub cache: CacheConfig,
    pub controls: ControlsConfig,
    pub appearance: AppearanceConfig,
    pub spotify: SpotifyConfig,
    /// File the config was read from, if any.
    pub source: Option<PathBuf>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::candidates().into_iter().find(|p| p.exists()) {
            Some(path) => Self::load_from(&path)?,
            None => Config::default(),
        };
        config.spotify.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&data)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        doc.try_into()
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("island.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("island.toml"));
            }
        }

        candidates
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    pub fast_interval: Duration,
    pub slow_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_interval: DEFAULT_FAST_INTERVAL,
            slow_interval: DEFAULT_SLOW_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlsConfig {
    pub volume_debounce: Duration,
    pub max_inflight_commands: usize,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            volume_debounce: DEFAULT_QUIET_PERIOD,
            max_inflight_commands: DEFAULT_MAX_INFLIGHT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppearanceConfig {
    pub default_accent: AccentColor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_cache: PathBuf,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_cache: PathBuf::from(".spotify_cache"),
        }
    }
}

impl SpotifyConfig {
    /// Environment (including a loaded `.env`) wins over the file.
    pub fn apply_env(&mut self) {
        if let Some(id) = non_empty_env("SPOTIPY_CLIENT_ID") {
            self.client_id = Some(id);
        }
        if let Some(secret) = non_empty_env("SPOTIPY_CLIENT_SECRET") {
            self.client_secret = Some(secret);
        }
        if let Some(path) = non_empty_env("ISLAND_TOKEN_CACHE") {
            self.token_cache = PathBuf::from(path);
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    polling: PollingSection,
    #[serde(default)]
    cache: CacheSection,
    #[serde(default)]
    controls: ControlsSection,
    #[serde(default)]
    appearance: AppearanceSection,
    #[serde(default)]
    spotify: SpotifySection,
}

impl TryFrom<ConfigDocument> for Config {
    type Error = anyhow::Error;

    fn try_from(value: ConfigDocument) -> anyhow::Result<Self> {
        let polling = PollingConfig {
            fast_interval: millis(value.polling.fast_interval_ms, DEFAULT_FAST_INTERVAL, 100, 10_000),
            slow_interval: millis(value.polling.slow_interval_ms, DEFAULT_SLOW_INTERVAL, 250, 60_000),
        };
        let cache = CacheConfig {
            capacity: value
                .cache
                .capacity
                .unwrap_or(DEFAULT_CAPACITY)
                .clamp(1, 1000),
        };
        let controls = ControlsConfig {
            volume_debounce: millis(value.controls.volume_debounce_ms, DEFAULT_QUIET_PERIOD, 10, 2000),
            max_inflight_commands: value
                .controls
                .max_inflight_commands
                .unwrap_or(DEFAULT_MAX_INFLIGHT)
                .clamp(1, 32),
        };
        let appearance = AppearanceConfig {
            default_accent: match value.appearance.default_accent {
                Some(hex) => hex
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("appearance.default_accent: {e}"))?,
                None => AccentColor::default(),
            },
        };
        let defaults = SpotifyConfig::default();
        let spotify = SpotifyConfig {
            client_id: value.spotify.client_id,
            client_secret: value.spotify.client_secret,
            token_cache: value.spotify.token_cache.unwrap_or(defaults.token_cache),
        };

        Ok(Config {
            polling,
            cache,
            controls,
            appearance,
            spotify,
            source: None,
        })
    }
}

fn millis(value: Option<u64>, default: Duration, min: u64, max: u64) -> Duration {
    value
        .map(|ms| Duration::from_millis(ms.clamp(min, max)))
        .unwrap_or(default)
}

#[derive(Debug, Default, Deserialize)]
struct PollingSection {
    fast_interval_ms: Option<u64>,
    slow_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSection {
    capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ControlsSection {
    volume_debounce_ms: Option<u64>,
    max_inflight_commands: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AppearanceSection {
    default_accent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SpotifySection {
    client_id: Option<String>,
    client_secret: Option<String>,
    token_cache: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.controls.volume_debounce, Duration::from_millis(150));
        assert_eq!(config.appearance.default_accent, AccentColor::SPOTIFY_GREEN);
        assert_eq!(config.spotify.token_cache, PathBuf::from(".spotify_cache"));
    }

    #[test]
    fn sections_override_and_clamp() {
        let config = Config::parse(
            r##"
            [polling]
            fast_interval_ms = 20
            slow_interval_ms = 3000

            [cache]
            capacity = 8

            [controls]
            max_inflight_commands = 100

            [appearance]
            default_accent = "#ff8800"
            "##,
        )
        .unwrap();

        assert_eq!(config.polling.fast_interval, Duration::from_millis(100));
        assert_eq!(config.polling.slow_interval, Duration::from_millis(3000));
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.controls.max_inflight_commands, 32);
        assert_eq!(config.appearance.default_accent, AccentColor::rgb(0xff, 0x88, 0x00));
    }

    #[test]
    fn bad_accent_is_reported() {
        let err = Config::parse("[appearance]\ndefault_accent = \"green\"").unwrap_err();
        assert!(err.to_string().contains("default_accent"));
    }

    #[test]
    fn load_from_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[spotify]\nclient_id = \"abc\"\ntoken_cache = \"tok.json\"").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(config.spotify.client_id.as_deref(), Some("abc"));
        assert_eq!(config.spotify.token_cache, PathBuf::from("tok.json"));
    }
}

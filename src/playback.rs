use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::color::AccentColor;

/// Repeat setting as the playback service reports it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Context,
}

impl RepeatMode {
    /// Next mode in the fixed cycle `off -> context -> track -> off`.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Context,
            RepeatMode::Context => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Context => "context",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(RepeatMode::Off),
            "track" => Ok(RepeatMode::Track),
            "context" => Ok(RepeatMode::Context),
            other => Err(format!("unknown repeat mode: {other}")),
        }
    }
}

/// One poll's view of playback. Built once, never mutated by the poller.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    /// Largest first, as the service lists them.
    pub album_art_urls: Vec<String>,
    pub is_playing: bool,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    pub device_volume_percent: Option<u8>,
}

impl PlaybackSnapshot {
    /// The smallest listed image, which is plenty for a thumbnail.
    pub fn artwork_url(&self) -> Option<&str> {
        self.album_art_urls.last().map(String::as_str)
    }

    pub fn progress_fraction(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.progress_ms as f64 / self.duration_ms as f64).clamp(0.0, 1.0)
    }
}

/// The widget's locally authoritative belief about playback.
#[derive(Clone, Debug)]
pub struct ReconciledState {
    pub snapshot: Option<PlaybackSnapshot>,
    pub is_seeking: bool,
    pub is_volume_editing: bool,
    /// `None` until the library lookup for the current track resolves.
    pub liked: Option<bool>,
    pub artwork_url: Option<String>,
    pub accent: AccentColor,
    /// Last known device volume, kept across idle periods.
    pub volume_percent: Option<u8>,
}

impl ReconciledState {
    pub fn idle(accent: AccentColor) -> Self {
        Self {
            snapshot: None,
            is_seeking: false,
            is_volume_editing: false,
            liked: None,
            artwork_url: None,
            accent,
            volume_percent: None,
        }
    }

    pub fn track_id(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.track_id.as_str())
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot.as_ref().map(|s| s.is_playing).unwrap_or(false)
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.snapshot
            .as_ref()
            .map(|s| s.shuffle_enabled)
            .unwrap_or(false)
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.snapshot
            .as_ref()
            .map(|s| s.repeat_mode)
            .unwrap_or_default()
    }

    /// Drop track identity and everything derived from it.
    pub fn reset_to_idle(&mut self, accent: AccentColor) {
        self.snapshot = None;
        self.is_seeking = false;
        self.liked = None;
        self.artwork_url = None;
        self.accent = accent;
    }
}

pub fn format_timestamp(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

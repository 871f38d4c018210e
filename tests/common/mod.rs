#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    },
    time::{Duration, Instant},
};

use image::{ImageFormat, Rgba, RgbaImage};
use island_sync::{
    error::{ApiError, ResourceError},
    playback::{PlaybackSnapshot, RepeatMode},
    resource::ResourceProvider,
    PlaybackApi, PlaybackCommand,
};
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(3);

pub fn track(id: &str) -> PlaybackSnapshot {
    PlaybackSnapshot {
        track_id: id.to_string(),
        track_name: format!("Song {id}"),
        artist_name: "Artist".to_string(),
        album_art_urls: vec![format!("https://img/{id}/640"), format!("https://img/{id}/64")],
        is_playing: true,
        progress_ms: 30_000,
        duration_ms: 200_000,
        shuffle_enabled: false,
        repeat_mode: RepeatMode::Off,
        device_volume_percent: Some(40),
    }
}

/// Scriptable playback service recording every command it receives.
pub struct FakeApi {
    playback: Mutex<VecDeque<Result<Option<PlaybackSnapshot>, ApiError>>>,
    last_playback: Mutex<Option<PlaybackSnapshot>>,
    liked: Mutex<HashMap<String, bool>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    commands_tx: Mutex<mpsc::Sender<PlaybackCommand>>,
    commands_rx: Mutex<mpsc::Receiver<PlaybackCommand>>,
    like_delay: Mutex<Option<Duration>>,
    pub reauth_calls: AtomicUsize,
    pub like_lookups: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        Arc::new(Self {
            playback: Mutex::new(VecDeque::new()),
            last_playback: Mutex::new(None),
            liked: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            commands_tx: Mutex::new(tx),
            commands_rx: Mutex::new(rx),
            like_delay: Mutex::new(None),
            reauth_calls: AtomicUsize::new(0),
            like_lookups: AtomicUsize::new(0),
        })
    }

    /// Queue poll results; once drained the last `Ok` value repeats.
    pub fn script(&self, result: Result<Option<PlaybackSnapshot>, ApiError>) {
        self.playback.lock().push_back(result);
    }

    pub fn set_liked(&self, track_id: &str, liked: bool) {
        self.liked.lock().insert(track_id.to_string(), liked);
    }

    pub fn liked(&self, track_id: &str) -> Option<bool> {
        self.liked.lock().get(track_id).copied()
    }

    /// The next library lookup reads its answer, then stalls for `delay`
    /// before returning it.
    pub fn stall_next_like_lookup(&self, delay: Duration) {
        *self.like_delay.lock() = Some(delay);
    }

    /// Make the named call fail with `err` until cleared.
    pub fn fail(&self, call: &'static str, err: ApiError) {
        self.failures.lock().insert(call, err);
    }

    pub fn clear(&self, call: &'static str) {
        self.failures.lock().remove(call);
    }

    pub fn next_command(&self, timeout: Duration) -> Option<PlaybackCommand> {
        self.commands_rx.lock().recv_timeout(timeout).ok()
    }

    /// Everything received so far plus anything arriving within `settle`.
    pub fn drain_commands(&self, settle: Duration) -> Vec<PlaybackCommand> {
        let rx = self.commands_rx.lock();
        let mut commands = Vec::new();
        while let Ok(command) = rx.recv_timeout(settle) {
            commands.push(command);
        }
        commands
    }

    fn record(&self, call: &'static str, command: PlaybackCommand) -> Result<(), ApiError> {
        let _ = self.commands_tx.lock().send(command);
        match self.failures.lock().get(call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl PlaybackApi for FakeApi {
    fn get_playback(&self) -> Result<Option<PlaybackSnapshot>, ApiError> {
        match self.playback.lock().pop_front() {
            Some(Ok(snapshot)) => {
                *self.last_playback.lock() = snapshot.clone();
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last_playback.lock().clone()),
        }
    }

    fn play(&self) -> Result<(), ApiError> {
        self.record("play", PlaybackCommand::Play)
    }

    fn pause(&self) -> Result<(), ApiError> {
        self.record("pause", PlaybackCommand::Pause)
    }

    fn next(&self) -> Result<(), ApiError> {
        self.record("next", PlaybackCommand::Next)
    }

    fn previous(&self) -> Result<(), ApiError> {
        self.record("previous", PlaybackCommand::Previous)
    }

    fn set_shuffle(&self, enabled: bool) -> Result<(), ApiError> {
        self.record("set_shuffle", PlaybackCommand::SetShuffle(enabled))
    }

    fn set_repeat(&self, mode: RepeatMode) -> Result<(), ApiError> {
        self.record("set_repeat", PlaybackCommand::SetRepeat(mode))
    }

    fn seek(&self, position_ms: u64) -> Result<(), ApiError> {
        self.record("seek", PlaybackCommand::Seek(position_ms))
    }

    fn set_volume(&self, percent: u8) -> Result<(), ApiError> {
        self.record("set_volume", PlaybackCommand::SetVolume(percent))
    }

    fn is_liked(&self, track_id: &str) -> Result<bool, ApiError> {
        self.like_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().get("is_liked") {
            return Err(err.clone());
        }
        let liked = self.liked(track_id).unwrap_or(false);
        let stall = self.like_delay.lock().take();
        if let Some(delay) = stall {
            std::thread::sleep(delay);
        }
        Ok(liked)
    }

    fn add_liked(&self, track_id: &str) -> Result<(), ApiError> {
        self.record("add_liked", PlaybackCommand::AddLiked(track_id.to_string()))?;
        self.set_liked(track_id, true);
        Ok(())
    }

    fn remove_liked(&self, track_id: &str) -> Result<(), ApiError> {
        self.record("remove_liked", PlaybackCommand::RemoveLiked(track_id.to_string()))?;
        self.set_liked(track_id, false);
        Ok(())
    }

    fn reauthenticate(&self) -> Result<(), ApiError> {
        self.reauth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves solid-colour PNGs; unknown URLs fail to fetch.
#[derive(Default)]
pub struct PngProvider {
    images: Mutex<HashMap<String, Vec<u8>>>,
    pub fetches: AtomicUsize,
}

impl PngProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, color: [u8; 3]) {
        self.images.lock().insert(url.to_string(), solid_png(color));
    }
}

impl ResourceProvider for PngProvider {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ResourceError::Fetch {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            })
    }
}

pub fn solid_png([r, g, b]: [u8; 3]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(16, 16, Rgba([r, g, b, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

/// Receive until `pred` matches or the deadline passes.
pub fn wait_for<T>(rx: &mpsc::Receiver<T>, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(item) if pred(&item) => return Some(item),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{client::PlaybackApi, error::ApiError, playback::PlaybackSnapshot};

pub const DEFAULT_FAST_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_SLOW_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Clone, Debug, PartialEq)]
pub enum PollEvent {
    /// Edge-triggered: fired when the track identity changes, including the
    /// transition to nothing playing (`None`).
    TrackChanged(Option<PlaybackSnapshot>),
    /// Fired on every successful poll with a track.
    PlaybackTick(PlaybackSnapshot),
}

/// Turns a stream of fetched snapshots into change events.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_track_id: Option<String>,
    is_playing: bool,
}

impl ChangeDetector {
    pub fn observe(&mut self, fetched: Option<PlaybackSnapshot>) -> Vec<PollEvent> {
        match fetched {
            Some(snapshot) => {
                self.is_playing = snapshot.is_playing;
                let mut events = Vec::with_capacity(2);
                if self.last_track_id.as_deref() != Some(snapshot.track_id.as_str()) {
                    self.last_track_id = Some(snapshot.track_id.clone());
                    events.push(PollEvent::TrackChanged(Some(snapshot.clone())));
                }
                events.push(PollEvent::PlaybackTick(snapshot));
                events
            }
            None => {
                self.is_playing = false;
                if self.last_track_id.take().is_some() {
                    vec![PollEvent::TrackChanged(None)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn last_track_id(&self) -> Option<&str> {
        self.last_track_id.as_deref()
    }
}

/// Poll cadence, shared so a config reload can retune a running poller.
#[derive(Debug)]
pub struct PollIntervals {
    fast_ms: AtomicU64,
    slow_ms: AtomicU64,
}

impl PollIntervals {
    pub fn new(fast: Duration, slow: Duration) -> Self {
        Self {
            fast_ms: AtomicU64::new(fast.as_millis() as u64),
            slow_ms: AtomicU64::new(slow.as_millis() as u64),
        }
    }

    pub fn set(&self, fast: Duration, slow: Duration) {
        self.fast_ms.store(fast.as_millis() as u64, Ordering::Relaxed);
        self.slow_ms.store(slow.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn fast(&self) -> Duration {
        Duration::from_millis(self.fast_ms.load(Ordering::Relaxed))
    }

    pub fn slow(&self) -> Duration {
        Duration::from_millis(self.slow_ms.load(Ordering::Relaxed))
    }

    /// Poll aggressively while playing so the seek bar stays smooth, back off
    /// otherwise to spare the API.
    pub fn for_state(&self, is_playing: bool) -> Duration {
        if is_playing {
            self.fast()
        } else {
            self.slow()
        }
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self::new(DEFAULT_FAST_INTERVAL, DEFAULT_SLOW_INTERVAL)
    }
}

pub struct Poller {
    api: Arc<dyn PlaybackApi>,
    detector: ChangeDetector,
    intervals: Arc<PollIntervals>,
}

impl Poller {
    pub fn new(api: Arc<dyn PlaybackApi>, intervals: Arc<PollIntervals>) -> Self {
        Self {
            api,
            detector: ChangeDetector::default(),
            intervals,
        }
    }

    /// One fetch-and-diff cycle. Failures yield no events and never escape.
    pub fn poll_once(&mut self) -> Vec<PollEvent> {
        match self.api.get_playback() {
            Ok(fetched) => self.detector.observe(fetched),
            Err(ApiError::AuthExpired(reason)) => {
                log::warn!("Playback authorization expired ({reason}); re-authenticating");
                if let Err(err) = self.api.reauthenticate() {
                    log::warn!("Re-authentication failed: {err}");
                }
                Vec::new()
            }
            Err(err) => {
                log::debug!("Playback poll failed: {err}");
                Vec::new()
            }
        }
    }

    pub fn next_interval(&self) -> Duration {
        self.intervals.for_state(self.detector.is_playing())
    }

    /// Run on a dedicated thread. The sink returns `false` once nobody is
    /// listening, which also stops the loop.
    pub fn spawn<F>(mut self, mut sink: F) -> io::Result<PollerHandle>
    where
        F: FnMut(PollEvent) -> bool + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let worker = thread::Builder::new()
            .name("island-poller".into())
            .spawn(move || {
                log::debug!("Poller started");
                'cycles: while flag.load(Ordering::Acquire) {
                    for event in self.poll_once() {
                        if !sink(event) {
                            break 'cycles;
                        }
                    }
                    thread::sleep(self.next_interval());
                }
                flag.store(false, Ordering::Release);
                log::debug!("Poller stopped");
            })?;

        Ok(PollerHandle {
            running,
            worker: Some(worker),
        })
    }
}

pub struct PollerHandle {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Takes effect within one sleep interval; blocks until the thread exits.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

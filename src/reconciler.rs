use std::{
    io,
    sync::{mpsc, Arc},
    time::Duration,
};

use crate::{
    cache::{Artwork, ArtworkCache},
    client::{PlaybackApi, PlaybackCommand},
    color::AccentColor,
    debounce::{Debouncer, DEFAULT_QUIET_PERIOD},
    error::{ApiError, ResourceError},
    events::{Intent, IslandEvent, Message},
    playback::{PlaybackSnapshot, ReconciledState},
    poller::PollEvent,
    workers::CommandPool,
};

/// Volume assumed for relative steps before any device has reported one.
const FALLBACK_VOLUME: u8 = 50;

#[derive(Clone, Debug)]
pub struct ReconcilerSettings {
    pub default_accent: AccentColor,
    pub volume_quiet_period: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            default_accent: AccentColor::default(),
            volume_quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

/// Owner of [`ReconciledState`]. Only the dispatcher thread calls into it;
/// background work reports back through the inbox as [`Message`]s.
pub struct Reconciler {
    state: ReconciledState,
    api: Arc<dyn PlaybackApi>,
    cache: Arc<ArtworkCache>,
    pool: CommandPool,
    inbox: mpsc::Sender<Message>,
    events: mpsc::Sender<IslandEvent>,
    volume: Debouncer<u8>,
    default_accent: AccentColor,
    /// Bumped on every track change and like toggle.
    like_generation: u64,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn PlaybackApi>,
        cache: Arc<ArtworkCache>,
        pool: CommandPool,
        inbox: mpsc::Sender<Message>,
        events: mpsc::Sender<IslandEvent>,
        settings: ReconcilerSettings,
    ) -> io::Result<Self> {
        let settled = inbox.clone();
        let volume = Debouncer::spawn(settings.volume_quiet_period, move |percent| {
            let _ = settled.send(Message::VolumeSettled(percent));
        })?;

        Ok(Self {
            state: ReconciledState::idle(settings.default_accent),
            api,
            cache,
            pool,
            inbox,
            events,
            volume,
            default_accent: settings.default_accent,
            like_generation: 0,
        })
    }

    pub fn state(&self) -> &ReconciledState {
        &self.state
    }

    /// Apply one message. Returns `false` on shutdown.
    pub fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Poll(PollEvent::TrackChanged(snapshot)) => self.apply_track_changed(snapshot),
            Message::Poll(PollEvent::PlaybackTick(snapshot)) => self.apply_playback_tick(snapshot),
            Message::Intent(intent) => self.apply_intent(intent),
            Message::LikeResolved {
                track_id,
                generation,
                liked,
            } => self.apply_like_resolved(&track_id, generation, liked),
            Message::ArtworkResolved { url, result } => self.apply_artwork_resolved(&url, result),
            Message::VolumeSettled(percent) => self.apply_volume_settled(percent),
            Message::Shutdown => {
                self.flush_pending_volume();
                return false;
            }
        }
        true
    }

    pub fn apply_intent(&mut self, intent: Intent) {
        match intent {
            Intent::SeekBegin => self.apply_user_seek_begin(),
            Intent::SeekCommit(fraction) => self.apply_user_seek_commit(fraction),
            Intent::VolumeChange(percent) => self.apply_user_volume_change(percent),
            Intent::VolumeStep(delta) => self.apply_user_volume_step(delta),
            Intent::ToggleShuffle => self.toggle_shuffle(),
            Intent::ToggleLike => self.toggle_like(),
            Intent::CycleRepeat => self.cycle_repeat(),
            Intent::TogglePlay => self.toggle_play(),
            Intent::Next => self.dispatch(PlaybackCommand::Next),
            Intent::Previous => self.dispatch(PlaybackCommand::Previous),
        }
    }

    pub fn apply_track_changed(&mut self, snapshot: Option<PlaybackSnapshot>) {
        let Some(snapshot) = snapshot else {
            log::info!("Playback went idle");
            self.state.reset_to_idle(self.default_accent);
            self.emit(IslandEvent::TrackChanged(None));
            self.emit(IslandEvent::ColorExtracted(self.default_accent));
            return;
        };

        log::info!(
            "Now playing: {} - {}",
            snapshot.track_name,
            snapshot.artist_name
        );
        if self.state.track_id() != Some(snapshot.track_id.as_str()) {
            // A drag on the previous track must not hold this one's progress.
            self.state.is_seeking = false;
        }
        let merged = self.merge_suppressed(snapshot);
        let track_id = merged.track_id.clone();
        let artwork_url = merged.artwork_url().map(str::to_owned);

        self.state.snapshot = Some(merged.clone());
        self.state.liked = None;
        self.like_generation += 1;
        self.emit(IslandEvent::TrackChanged(Some(merged)));

        self.request_like_status(track_id);
        self.resolve_artwork(artwork_url);
    }

    pub fn apply_playback_tick(&mut self, snapshot: PlaybackSnapshot) {
        if self.state.track_id() != Some(snapshot.track_id.as_str()) {
            log::debug!("Ignoring tick for {}, not the current track", snapshot.track_id);
            return;
        }
        let merged = self.merge_suppressed(snapshot);
        self.state.snapshot = Some(merged.clone());
        self.emit(IslandEvent::PlaybackTick(merged));
    }

    pub fn apply_user_seek_begin(&mut self) {
        self.state.is_seeking = true;
    }

    pub fn apply_user_seek_commit(&mut self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let target = self.state.snapshot.as_mut().map(|snapshot| {
            let position = (fraction * snapshot.duration_ms as f64).round() as u64;
            snapshot.progress_ms = position;
            position
        });
        match target {
            Some(position) => self.dispatch(PlaybackCommand::Seek(position)),
            None => log::debug!("Seek with no active track ignored"),
        }
        // Cleared once the seek is on its way; the next poll confirms it.
        self.state.is_seeking = false;
    }

    pub fn apply_user_volume_change(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.state.volume_percent = Some(percent);
        if let Some(snapshot) = self.state.snapshot.as_mut() {
            snapshot.device_volume_percent = Some(percent);
        }
        self.state.is_volume_editing = true;
        self.volume.push(percent);
    }

    pub fn apply_user_volume_step(&mut self, delta: i8) {
        let current = self.state.volume_percent.unwrap_or(FALLBACK_VOLUME) as i16;
        let target = (current + delta as i16).clamp(0, 100) as u8;
        self.apply_user_volume_change(target);
    }

    pub fn toggle_shuffle(&mut self) {
        let target = !self.state.shuffle_enabled();
        self.dispatch(PlaybackCommand::SetShuffle(target));
    }

    pub fn cycle_repeat(&mut self) {
        let target = self.state.repeat_mode().next();
        self.dispatch(PlaybackCommand::SetRepeat(target));
    }

    pub fn toggle_play(&mut self) {
        let command = if self.state.is_playing() {
            PlaybackCommand::Pause
        } else {
            PlaybackCommand::Play
        };
        self.dispatch(command);
    }

    /// Library membership has no polled echo, so the flip is shown right
    /// away. A failed write re-reads the real value.
    pub fn toggle_like(&mut self) {
        let Some(track_id) = self.state.track_id().map(str::to_owned) else {
            return;
        };
        let api = self.api.clone();
        let inbox = self.inbox.clone();
        self.like_generation += 1;
        let generation = self.like_generation;

        match self.state.liked {
            Some(liked) => {
                let target = !liked;
                self.state.liked = Some(target);
                self.emit(IslandEvent::LikeChanged(target));
                self.pool.spawn(move || {
                    let command = like_command(&track_id, target);
                    if let Err(err) = command.execute(api.as_ref()) {
                        log_command_failure(&command, &err);
                        if let Ok(actual) = api.is_liked(&track_id) {
                            let _ = inbox.send(Message::LikeResolved {
                                track_id,
                                generation,
                                liked: actual,
                            });
                        }
                    }
                });
            }
            None => {
                self.pool.spawn(move || {
                    let current = match api.is_liked(&track_id) {
                        Ok(current) => current,
                        Err(err) => {
                            log::debug!("Like lookup for {track_id} failed: {err}");
                            return;
                        }
                    };
                    let command = like_command(&track_id, !current);
                    let liked = match command.execute(api.as_ref()) {
                        Ok(()) => !current,
                        Err(err) => {
                            log_command_failure(&command, &err);
                            current
                        }
                    };
                    let _ = inbox.send(Message::LikeResolved {
                        track_id,
                        generation,
                        liked,
                    });
                });
            }
        }
    }

    fn apply_like_resolved(&mut self, track_id: &str, generation: u64, liked: bool) {
        if self.state.track_id() != Some(track_id) {
            return;
        }
        if generation < self.like_generation {
            log::debug!("Dropping like result for {track_id} overtaken by a newer toggle");
            return;
        }
        if self.state.liked != Some(liked) {
            self.state.liked = Some(liked);
            self.emit(IslandEvent::LikeChanged(liked));
        }
    }

    fn apply_artwork_resolved(&mut self, url: &str, result: Result<Artwork, ResourceError>) {
        if self.state.artwork_url.as_deref() != Some(url) {
            log::debug!("Dropping stale artwork for {url}");
            return;
        }
        match result {
            Ok(artwork) => self.apply_artwork(artwork),
            Err(err) => {
                log::warn!("Artwork unavailable: {err}");
                // Forget the URL so the next track on this album retries it.
                self.state.artwork_url = None;
                self.state.accent = self.default_accent;
                self.emit(IslandEvent::ColorExtracted(self.default_accent));
            }
        }
    }

    fn apply_volume_settled(&mut self, percent: u8) {
        // A newer value may already be waiting in the debouncer.
        if self.state.volume_percent == Some(percent) {
            self.state.is_volume_editing = false;
        }
        self.dispatch(PlaybackCommand::SetVolume(percent));
    }

    /// The dispatcher stops reading after shutdown, so a drag still waiting
    /// in the debouncer is sent directly.
    fn flush_pending_volume(&mut self) {
        if !self.state.is_volume_editing {
            return;
        }
        self.state.is_volume_editing = false;
        if let Some(percent) = self.state.volume_percent {
            self.dispatch(PlaybackCommand::SetVolume(percent));
        }
    }

    /// Keep the user's in-flight seek/volume over what the server reports.
    fn merge_suppressed(&mut self, mut incoming: PlaybackSnapshot) -> PlaybackSnapshot {
        if self.state.is_seeking {
            if let Some(current) = self.state.snapshot.as_ref() {
                if current.track_id == incoming.track_id {
                    incoming.progress_ms = current.progress_ms;
                }
            }
        }

        if self.state.is_volume_editing {
            incoming.device_volume_percent = self.state.volume_percent;
        } else if incoming.device_volume_percent.is_some() {
            self.state.volume_percent = incoming.device_volume_percent;
        }

        incoming
    }

    fn request_like_status(&self, track_id: String) {
        let api = self.api.clone();
        let inbox = self.inbox.clone();
        let generation = self.like_generation;
        self.pool.spawn(move || match api.is_liked(&track_id) {
            Ok(liked) => {
                let _ = inbox.send(Message::LikeResolved {
                    track_id,
                    generation,
                    liked,
                });
            }
            Err(err) => log::debug!("Like lookup for {track_id} failed: {err}"),
        });
    }

    fn resolve_artwork(&mut self, url: Option<String>) {
        let Some(url) = url else {
            self.state.artwork_url = None;
            self.state.accent = self.default_accent;
            self.emit(IslandEvent::ColorExtracted(self.default_accent));
            return;
        };
        if self.state.artwork_url.as_deref() == Some(url.as_str()) {
            return;
        }
        self.state.artwork_url = Some(url.clone());

        if let Some(artwork) = self.cache.peek(&url) {
            self.apply_artwork(artwork);
            return;
        }

        let cache = self.cache.clone();
        let inbox = self.inbox.clone();
        self.pool.spawn(move || {
            let result = cache.get_or_fetch(&url);
            let _ = inbox.send(Message::ArtworkResolved { url, result });
        });
    }

    fn apply_artwork(&mut self, artwork: Artwork) {
        self.state.accent = artwork.accent;
        self.emit(IslandEvent::ArtworkLoaded(artwork.image));
        self.emit(IslandEvent::ColorExtracted(artwork.accent));
    }

    fn dispatch(&self, command: PlaybackCommand) {
        log::debug!("Dispatching {command}");
        let api = self.api.clone();
        self.pool.spawn(move || {
            if let Err(err) = command.execute(api.as_ref()) {
                log_command_failure(&command, &err);
            }
        });
    }

    fn emit(&self, event: IslandEvent) {
        // The presentation layer may already be gone during shutdown.
        let _ = self.events.send(event);
    }
}

fn like_command(track_id: &str, liked: bool) -> PlaybackCommand {
    if liked {
        PlaybackCommand::AddLiked(track_id.to_string())
    } else {
        PlaybackCommand::RemoveLiked(track_id.to_string())
    }
}

fn log_command_failure(command: &PlaybackCommand, err: &ApiError) {
    match err {
        ApiError::Restricted(_) => log::debug!("Dropped {command}: {err}"),
        ApiError::Transient(_) | ApiError::AuthExpired(_) => {
            log::warn!("Command {command} failed: {err}")
        }
    }
}

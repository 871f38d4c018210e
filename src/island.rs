use std::{
    io,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    cache::ArtworkCache,
    client::PlaybackApi,
    color::AccentColor,
    config::{Config, PollingConfig},
    events::{Intent, IslandEvent, Message},
    poller::{PollIntervals, Poller, PollerHandle},
    reconciler::{Reconciler, ReconcilerSettings},
    resource::ResourceProvider,
    workers::CommandPool,
};

#[derive(Clone, Debug)]
pub struct IslandSettings {
    pub fast_interval: Duration,
    pub slow_interval: Duration,
    pub cache_capacity: usize,
    pub volume_quiet_period: Duration,
    pub max_inflight_commands: usize,
    pub default_accent: AccentColor,
}

impl IslandSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fast_interval: config.polling.fast_interval,
            slow_interval: config.polling.slow_interval,
            cache_capacity: config.cache.capacity,
            volume_quiet_period: config.controls.volume_debounce,
            max_inflight_commands: config.controls.max_inflight_commands,
            default_accent: config.appearance.default_accent,
        }
    }
}

impl Default for IslandSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Cheap, cloneable sender for user intents.
#[derive(Clone)]
pub struct IslandHandle {
    inbox: mpsc::Sender<Message>,
}

impl IslandHandle {
    /// `false` once the island has shut down.
    pub fn send(&self, intent: Intent) -> bool {
        self.inbox.send(Message::Intent(intent)).is_ok()
    }
}

/// The running core: poller thread, dispatcher thread and the worker pool,
/// all feeding one serialized message queue.
pub struct Island {
    inbox: mpsc::Sender<Message>,
    poller: PollerHandle,
    dispatcher: Option<JoinHandle<()>>,
    intervals: Arc<PollIntervals>,
    cache: Arc<ArtworkCache>,
}

impl Island {
    pub fn start(
        api: Arc<dyn PlaybackApi>,
        provider: Arc<dyn ResourceProvider>,
        settings: IslandSettings,
    ) -> io::Result<(Self, mpsc::Receiver<IslandEvent>)> {
        let (inbox, inbox_rx) = mpsc::channel::<Message>();
        let (events_tx, events_rx) = mpsc::channel();

        let cache = Arc::new(ArtworkCache::new(settings.cache_capacity, provider));
        let pool = CommandPool::new(settings.max_inflight_commands)?;
        let mut reconciler = Reconciler::new(
            api.clone(),
            cache.clone(),
            pool,
            inbox.clone(),
            events_tx,
            ReconcilerSettings {
                default_accent: settings.default_accent,
                volume_quiet_period: settings.volume_quiet_period,
            },
        )?;

        let dispatcher = thread::Builder::new()
            .name("island-dispatch".into())
            .spawn(move || {
                while let Ok(message) = inbox_rx.recv() {
                    if !reconciler.handle(message) {
                        break;
                    }
                }
                log::debug!("Dispatcher stopped");
            })?;

        let intervals = Arc::new(PollIntervals::new(
            settings.fast_interval,
            settings.slow_interval,
        ));
        let poll_inbox = inbox.clone();
        let poller = Poller::new(api, intervals.clone())
            .spawn(move |event| poll_inbox.send(Message::Poll(event)).is_ok())?;

        log::info!(
            "Island started (poll {:?}/{:?}, cache {}, {} workers)",
            settings.fast_interval,
            settings.slow_interval,
            settings.cache_capacity,
            settings.max_inflight_commands
        );

        Ok((
            Self {
                inbox,
                poller,
                dispatcher: Some(dispatcher),
                intervals,
                cache,
            },
            events_rx,
        ))
    }

    pub fn handle(&self) -> IslandHandle {
        IslandHandle {
            inbox: self.inbox.clone(),
        }
    }

    pub fn send(&self, intent: Intent) -> bool {
        self.inbox.send(Message::Intent(intent)).is_ok()
    }

    pub fn cache(&self) -> &Arc<ArtworkCache> {
        &self.cache
    }

    /// Apply new poll intervals; the poller picks them up on its next sleep.
    pub fn retune(&self, polling: &PollingConfig) {
        self.intervals
            .set(polling.fast_interval, polling.slow_interval);
        log::info!(
            "Poll intervals now {:?} playing / {:?} idle",
            polling.fast_interval,
            polling.slow_interval
        );
    }

    pub fn intervals(&self) -> &Arc<PollIntervals> {
        &self.intervals
    }

    /// Stop polling (bounded by one interval), then drain the dispatcher.
    /// In-flight commands are left to finish on their own.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.poller.stop();
        let _ = self.inbox.send(Message::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
    }
}

impl Drop for Island {
    fn drop(&mut self) {
        self.stop();
    }
}

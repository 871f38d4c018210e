use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Context};
use island_sync::{
    config::Config,
    config_watch::ConfigWatcher,
    playback::format_timestamp,
    HttpResourceProvider, Island, IslandEvent, IslandSettings, SpotifyClient, SpotifyCredentials,
};

const EVENT_WAIT: Duration = Duration::from_millis(250);

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    match config.source.as_deref() {
        Some(path) => log::info!("Using config {}", path.display()),
        None => log::info!("No config file found; using defaults"),
    }

    let credentials = SpotifyCredentials {
        client_id: config
            .spotify
            .client_id
            .clone()
            .ok_or_else(|| anyhow!("No Spotify client id; set SPOTIPY_CLIENT_ID or [spotify].client_id"))?,
        client_secret: config.spotify.client_secret.clone(),
        token_cache: config.spotify.token_cache.clone(),
    };
    let api = Arc::new(SpotifyClient::new(credentials).context("Failed to build Spotify client")?);
    let provider = Arc::new(HttpResourceProvider::new().context("Failed to build artwork fetcher")?);

    let (island, events) = Island::start(api, provider, IslandSettings::from_config(&config))
        .context("Failed to start island threads")?;
    log::debug!("Artwork cache holds up to {} entries", island.cache().capacity());

    let watcher = match config.source.as_deref() {
        Some(path) => match ConfigWatcher::watch(path) {
            Ok(watcher) => {
                log::info!("Watching {} for changes", watcher.path().display());
                Some(watcher)
            }
            Err(err) => {
                log::warn!("Config hot reload disabled: {err:#}");
                None
            }
        },
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;

    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(EVENT_WAIT) {
            Ok(event) => log_event(&event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(updated) = watcher.as_ref().and_then(ConfigWatcher::poll) {
            island.retune(&updated.polling);
        }
    }

    log::info!("Shutting down");
    island.shutdown();
    Ok(())
}

fn log_event(event: &IslandEvent) {
    match event {
        IslandEvent::TrackChanged(Some(track)) => log::info!(
            "{} - {} [{}]",
            track.artist_name,
            track.track_name,
            format_timestamp(track.duration_ms)
        ),
        IslandEvent::TrackChanged(None) => log::info!("Nothing playing"),
        IslandEvent::PlaybackTick(track) => log::debug!(
            "{} {} / {} ({:.0}%)",
            if track.is_playing { "playing" } else { "paused" },
            format_timestamp(track.progress_ms),
            format_timestamp(track.duration_ms),
            track.progress_fraction() * 100.0
        ),
        IslandEvent::ColorExtracted(accent) => log::info!("Accent {}", accent.to_hex()),
        IslandEvent::ArtworkLoaded(image) => {
            log::debug!("Artwork {}x{}", image.width(), image.height())
        }
        IslandEvent::LikeChanged(liked) => {
            log::info!("{}", if *liked { "In your library" } else { "Not in your library" })
        }
    }
}

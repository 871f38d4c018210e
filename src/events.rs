use std::sync::Arc;

use image::RgbaImage;

use crate::{
    cache::Artwork, color::AccentColor, error::ResourceError, playback::PlaybackSnapshot,
    poller::PollEvent,
};

/// Updates for the presentation layer.
#[derive(Clone, Debug)]
pub enum IslandEvent {
    /// `None` when playback went idle.
    TrackChanged(Option<PlaybackSnapshot>),
    PlaybackTick(PlaybackSnapshot),
    ColorExtracted(AccentColor),
    ArtworkLoaded(Arc<RgbaImage>),
    LikeChanged(bool),
}

/// User gestures forwarded by the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Intent {
    SeekBegin,
    /// Position as a fraction of the track, `0.0..=1.0`.
    SeekCommit(f64),
    VolumeChange(u8),
    /// Relative change, e.g. from a scroll wheel.
    VolumeStep(i8),
    ToggleShuffle,
    ToggleLike,
    CycleRepeat,
    TogglePlay,
    Next,
    Previous,
}

/// Everything the dispatcher applies to the reconciler, in arrival order.
#[derive(Debug)]
pub enum Message {
    Poll(PollEvent),
    Intent(Intent),
    /// `generation` is the like generation current when the lookup or
    /// write started; older results are dropped.
    LikeResolved {
        track_id: String,
        generation: u64,
        liked: bool,
    },
    ArtworkResolved {
        url: String,
        result: Result<Artwork, ResourceError>,
    },
    VolumeSettled(u8),
    Shutdown,
}

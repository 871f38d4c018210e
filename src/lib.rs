//! Playback mirroring core for a floating "now playing" island: an adaptive
//! poller, a reconciler that owns the widget's view of playback, and a
//! bounded artwork/accent cache. The presentation layer talks to it through
//! [`Intent`]s in and [`IslandEvent`]s out.

pub mod auth;
pub mod cache;
pub mod client;
pub mod color;
pub mod config;
pub mod config_watch;
pub mod debounce;
pub mod error;
pub mod events;
pub mod island;
pub mod playback;
pub mod poller;
pub mod reconciler;
pub mod resource;
pub mod workers;

pub use cache::{Artwork, ArtworkCache};
pub use client::{PlaybackApi, PlaybackCommand, SpotifyClient, SpotifyCredentials};
pub use color::AccentColor;
pub use config::Config;
pub use error::{ApiError, ResourceError};
pub use events::{Intent, IslandEvent, Message};
pub use island::{Island, IslandHandle, IslandSettings};
pub use playback::{PlaybackSnapshot, ReconciledState, RepeatMode};
pub use poller::{ChangeDetector, PollEvent, PollIntervals, Poller};
pub use reconciler::{Reconciler, ReconcilerSettings};
pub use resource::{HttpResourceProvider, ResourceProvider};

//! Client-side playback of the story feed.
//!
//! [`group_feed`] turns the flat server feed into publisher groups,
//! [`PlaybackController`] is the pure state machine that walks them, and
//! [`Player`] drives the controller from a tokio task that owns the progress
//! timer.

pub mod client;
pub mod controller;
pub mod driver;
pub mod duration;
pub mod error;
pub mod feed;

pub use client::FeedClient;
pub use controller::{Effect, Input, PlaybackController, Position, Snapshot, Status};
pub use driver::{MediaEvents, MediaSurface, Player, PlayerHandle, ShowMedia, ViewSink};
pub use duration::{PlaybackConfig, resolve_duration};
pub use error::PlayerError;
pub use feed::{PublisherGroup, StoryEntry, group_feed};

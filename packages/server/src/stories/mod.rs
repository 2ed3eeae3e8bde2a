//! Story lifecycle: publishing, the aggregated feed, view accounting and the
//! background expiry sweep.
//!
//! Visibility is always derived as `is_active AND expires_at > now`. The
//! sweep only keeps `is_active` close to that; no read path relies on it.

mod error;
pub mod expiry;
pub mod feed;
pub mod store;
pub mod views;

pub use error::StoryError;
pub use expiry::{ExpiryScheduler, SweepHandle, sweep_expired};
pub use feed::{FeedFilter, FeedService};
pub use store::{
    NewMedia, NewStory, StagedBlob, StoryService, StoryWithMedia, lock_blob, release_blobs,
};
pub use views::{ViewTracker, ViewerIdentity};

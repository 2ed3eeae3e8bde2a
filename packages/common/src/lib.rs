pub mod clock;
pub mod storage;
pub mod story;

pub use clock::{Clock, ManualClock, SystemClock};
pub use story::{FeedItem, FeedMedia, FeedPublisher, FeedResponse, MediaKind};

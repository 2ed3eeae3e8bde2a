pub mod media;
pub mod story;

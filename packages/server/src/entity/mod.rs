pub mod agent;
pub mod story;
pub mod story_media;
pub mod story_view;

mod feed;
mod media;
mod stories;
mod views;

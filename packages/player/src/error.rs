#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The player task has already shut down.
    #[error("player is closed")]
    Closed,
}

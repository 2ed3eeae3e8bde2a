use std::time::Duration;

use common::{FeedMedia, MediaKind};
use serde::Deserialize;

/// Timing knobs for playback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Progress timer resolution.
    pub tick_ms: u64,
    /// Upper bound for any medium.
    pub max_duration_secs: u64,
    /// Lower bound for image hints.
    pub min_duration_secs: u64,
    /// Image without a hint.
    pub default_image_secs: u64,
    /// Video whose length is unknown and has no hint.
    pub default_video_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            max_duration_secs: 30,
            min_duration_secs: 1,
            default_image_secs: 5,
            default_video_secs: 15,
        }
    }
}

impl PlaybackConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// How long a medium stays on screen.
///
/// Images use their hint clamped to `[min, max]`. Videos use the decoded
/// length capped at `max`, falling back to the hint and then the default.
pub fn resolve_duration(
    media: &FeedMedia,
    natural: Option<Duration>,
    config: &PlaybackConfig,
) -> Duration {
    let max = Duration::from_secs(config.max_duration_secs);
    let min = Duration::from_secs(config.min_duration_secs).min(max);
    let hint = media
        .duration_secs
        .and_then(|s| u64::try_from(s).ok())
        .map(Duration::from_secs);

    match media.kind {
        MediaKind::Image => hint
            .unwrap_or(Duration::from_secs(config.default_image_secs))
            .clamp(min, max),
        MediaKind::Video => match natural.filter(|d| !d.is_zero()) {
            Some(len) => len.min(max),
            None => hint
                .filter(|d| !d.is_zero())
                .unwrap_or(Duration::from_secs(config.default_video_secs))
                .clamp(min, max),
        },
    }
}

#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a single story media item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "image"))]
    Image,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "video"))]
    Video,
}

impl MediaKind {
    /// Classify a MIME type. Anything that is not `image/*` or `video/*` is rejected.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let top = mime.split('/').next()?.trim().to_ascii_lowercase();
        match top.as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Publisher shown alongside a feed entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FeedPublisher {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = "Jane Realtor")]
    pub name: String,
    pub avatar_url: Option<String>,
}

/// One media item of a feed entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FeedMedia {
    #[schema(example = 12)]
    pub id: i32,
    pub kind: MediaKind,
    #[schema(example = "/api/v1/media/3f1a...c9.jpg")]
    pub url: String,
    pub thumbnail_url: Option<String>,
    /// Playback hint in seconds.
    #[schema(example = 5)]
    pub duration_secs: Option<i32>,
    /// Zero-based position within the story.
    #[schema(example = 0)]
    pub position: i32,
}

/// A single (story, media) row of the feed.
///
/// The feed is a flat sequence: stories newest first, and within a story the
/// media in ascending position. Consumers must group by `story_id` in
/// first-seen order and must not sort again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FeedItem {
    #[schema(example = 42)]
    pub story_id: i32,
    pub publisher: FeedPublisher,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub project_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub media: FeedMedia,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FeedResponse {
    pub data: Vec<FeedItem>,
}

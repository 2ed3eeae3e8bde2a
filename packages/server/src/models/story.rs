use chrono::{DateTime, Utc};
use common::MediaKind;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::entity::story_media;
use crate::stories::{NewMedia, NewStory, StoryWithMedia};

#[derive(Deserialize, ToSchema)]
pub struct CreateMediaRequest {
    pub kind: MediaKind,
    /// Public URL of the media file.
    #[schema(example = "https://cdn.example.com/tour/living-room.jpg")]
    pub url: String,
    pub thumbnail_url: Option<String>,
    /// Playback hint in seconds. Must be positive.
    #[schema(example = 5)]
    pub duration_secs: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateStoryRequest {
    #[schema(example = "Open house this Sunday")]
    pub title: Option<String>,
    pub caption: Option<String>,
    pub project_name: Option<String>,
    /// Lifetime in seconds. Defaults to the server setting and is clamped to
    /// the configured maximum.
    #[schema(example = 86400)]
    pub ttl_secs: Option<i64>,
    /// Media in display order. At least one item.
    pub media: Vec<CreateMediaRequest>,
}

impl From<CreateStoryRequest> for NewStory {
    fn from(req: CreateStoryRequest) -> Self {
        NewStory {
            title: req.title,
            caption: req.caption,
            project_name: req.project_name,
            ttl_secs: req.ttl_secs,
            media: req
                .media
                .into_iter()
                .map(|m| NewMedia {
                    kind: m.kind,
                    url: m.url,
                    thumbnail_url: m.thumbnail_url,
                    duration_secs: m.duration_secs,
                    blob_key: None,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct FeedQuery {
    /// Only publishers with this locale.
    pub locale: Option<String>,
}

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

#[derive(Serialize, ToSchema)]
pub struct MediaResponse {
    pub id: i32,
    pub kind: MediaKind,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub position: i32,
}

impl From<story_media::Model> for MediaResponse {
    fn from(m: story_media::Model) -> Self {
        Self {
            id: m.id,
            kind: m.kind,
            url: m.url,
            thumbnail_url: m.thumbnail_url,
            duration_secs: m.duration_secs,
            position: m.position,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StoryResponse {
    #[schema(example = 42)]
    pub id: i32,
    pub agent_id: i32,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub project_name: Option<String>,
    /// Stored flag, cleared by the expiry sweep.
    pub is_active: bool,
    /// `is_active` and not yet expired at response time.
    pub is_visible: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub media: Vec<MediaResponse>,
}

impl StoryResponse {
    pub fn new(found: StoryWithMedia, now: DateTime<Utc>) -> Self {
        let StoryWithMedia { story, media } = found;
        Self {
            is_visible: story.is_visible_at(now),
            id: story.id,
            agent_id: story.agent_id,
            title: story.title,
            caption: story.caption,
            project_name: story.project_name,
            is_active: story.is_active,
            expires_at: story.expires_at,
            created_at: story.created_at,
            media: media.into_iter().map(MediaResponse::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StoryListResponse {
    pub data: Vec<StoryResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct ViewCountResponse {
    #[schema(example = 42)]
    pub story_id: i32,
    #[schema(example = 17)]
    pub views: u64,
}

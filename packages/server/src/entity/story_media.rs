use common::MediaKind;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "story_media")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "story_position", indexed)]
    pub story_id: i32,
    #[sea_orm(belongs_to, from = "story_id", to = "id")]
    pub story: HasOne<super::story::Entity>,

    pub kind: MediaKind,

    #[sea_orm(column_type = "Text")]
    pub url: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub thumbnail_url: Option<String>,

    /// Playback hint in seconds.
    pub duration_secs: Option<i32>,

    /// Dense, zero-based order within the story.
    #[sea_orm(unique_key = "story_position")]
    pub position: i32,

    /// Media store key for uploaded files. NULL for external URLs.
    #[sea_orm(indexed)]
    pub blob_key: Option<String>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per (story, viewer identity).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "story_view")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "story_viewer", indexed)]
    pub story_id: i32,
    #[sea_orm(belongs_to, from = "story_id", to = "id")]
    pub story: HasOne<super::story::Entity>,

    /// `user:<id>` or `anon:<fingerprint>`.
    #[sea_orm(unique_key = "story_viewer")]
    pub viewer_key: String,

    pub viewer_id: Option<i32>,
    pub fingerprint: Option<String>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "story")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub agent_id: i32,
    #[sea_orm(belongs_to, from = "agent_id", to = "id")]
    pub agent: HasOne<super::agent::Entity>,

    pub title: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub caption: Option<String>,
    pub project_name: Option<String>,

    /// Cleared by the expiry sweep. Never set back to true.
    pub is_active: bool,

    /// Fixed at creation.
    pub expires_at: DateTimeUtc,

    #[sea_orm(has_many)]
    pub media: HasMany<super::story_media::Entity>,

    #[sea_orm(has_many)]
    pub views: HasMany<super::story_view::Entity>,

    pub created_at: DateTimeUtc,
}

impl Model {
    /// Derived visibility: active and not yet expired at `now`.
    pub fn is_visible_at(&self, now: DateTimeUtc) -> bool {
        self.is_active && self.expires_at > now
    }
}

impl ActiveModelBehavior for ActiveModel {}

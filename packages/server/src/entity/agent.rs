use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Publisher profile. Managed elsewhere; stories only read it.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agent")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Account that owns this profile. Set when the profile is created.
    #[sea_orm(unique)]
    pub user_id: i32,

    pub name: String,
    pub avatar_url: Option<String>,

    /// Feed scope, e.g. "en" or "fr".
    #[sea_orm(indexed)]
    pub locale: Option<String>,

    #[sea_orm(has_many)]
    pub stories: HasMany<super::story::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use tracing::debug;

use crate::entity::{story, story_view};

use super::StoryError;

/// Who saw a story. An authenticated account wins over a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerIdentity {
    User(i32),
    Anonymous(String),
}

impl ViewerIdentity {
    pub fn resolve(user_id: Option<i32>, fingerprint: Option<String>) -> Option<Self> {
        match (user_id, fingerprint) {
            (Some(id), _) => Some(Self::User(id)),
            (None, Some(fp)) if !fp.trim().is_empty() => Some(Self::Anonymous(fp)),
            _ => None,
        }
    }

    /// Deduplication key stored in `story_view.viewer_key`.
    pub fn key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Anonymous(fp) => format!("anon:{fp}"),
        }
    }
}

pub struct ViewTracker<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> ViewTracker<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Record that `viewer` saw a visible story and return its view count.
    /// Repeated views by the same identity are ignored.
    pub async fn record_view(
        &self,
        story_id: i32,
        viewer: &ViewerIdentity,
        now: DateTime<Utc>,
    ) -> Result<u64, StoryError> {
        let visible = story::Entity::find_by_id(story_id)
            .one(self.conn)
            .await?
            .is_some_and(|s| s.is_visible_at(now));
        if !visible {
            return Err(StoryError::NotFound(format!("Story {story_id} not found")));
        }

        let (viewer_id, fingerprint) = match viewer {
            ViewerIdentity::User(id) => (Some(*id), None),
            ViewerIdentity::Anonymous(fp) => (None, Some(fp.clone())),
        };
        let row = story_view::ActiveModel {
            story_id: Set(story_id),
            viewer_key: Set(viewer.key()),
            viewer_id: Set(viewer_id),
            fingerprint: Set(fingerprint),
            created_at: Set(now),
            ..Default::default()
        };

        let result = story_view::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    story_view::Column::StoryId,
                    story_view::Column::ViewerKey,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await;

        match result {
            Ok(_) => {}
            Err(DbErr::RecordNotInserted) => {
                debug!(story_id, viewer = %viewer.key(), "Repeat view ignored");
            }
            Err(e) => return Err(e.into()),
        }

        self.count_views(story_id).await
    }

    pub async fn count_views(&self, story_id: i32) -> Result<u64, StoryError> {
        Ok(story_view::Entity::find()
            .filter(story_view::Column::StoryId.eq(story_id))
            .count(self.conn)
            .await?)
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{FeedItem, FeedMedia, FeedPublisher};
use sea_orm::sea_query::Query as SeaQuery;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::entity::{agent, story, story_media};

use super::StoryError;
use super::store::load_media_by_story;

/// Optional scope for the feed.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    /// Only publishers with this locale.
    pub locale: Option<String>,
    /// Only this publisher.
    pub agent_id: Option<i32>,
}

/// Read-only aggregation of currently visible stories.
pub struct FeedService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> FeedService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// The public feed: visible stories, newest first, at most `cap` stories.
    pub async fn active_feed(
        &self,
        now: DateTime<Utc>,
        filter: &FeedFilter,
        cap: u64,
    ) -> Result<Vec<FeedItem>, StoryError> {
        self.collect(now, filter, Some(cap)).await
    }

    /// A single publisher's visible stories. Owners get no exception for
    /// their own expired stories.
    pub async fn active_feed_for_publisher(
        &self,
        now: DateTime<Utc>,
        agent_id: i32,
    ) -> Result<Vec<FeedItem>, StoryError> {
        let filter = FeedFilter {
            agent_id: Some(agent_id),
            ..Default::default()
        };
        self.collect(now, &filter, None).await
    }

    async fn collect(
        &self,
        now: DateTime<Utc>,
        filter: &FeedFilter,
        cap: Option<u64>,
    ) -> Result<Vec<FeedItem>, StoryError> {
        let mut select = story::Entity::find()
            .filter(story::Column::IsActive.eq(true))
            .filter(story::Column::ExpiresAt.gt(now))
            // Stories without media are incomplete.
            .filter(
                story::Column::Id.in_subquery(
                    SeaQuery::select()
                        .column(story_media::Column::StoryId)
                        .from(story_media::Entity)
                        .to_owned(),
                ),
            );

        if let Some(agent_id) = filter.agent_id {
            select = select.filter(story::Column::AgentId.eq(agent_id));
        }
        if let Some(locale) = filter.locale.as_deref().map(str::trim)
            && !locale.is_empty()
        {
            select = select.filter(
                story::Column::AgentId.in_subquery(
                    SeaQuery::select()
                        .column(agent::Column::Id)
                        .from(agent::Entity)
                        .and_where(agent::Column::Locale.eq(locale))
                        .to_owned(),
                ),
            );
        }

        // Truncation drops the oldest stories.
        select = select
            .order_by_desc(story::Column::CreatedAt)
            .order_by_desc(story::Column::Id);
        if let Some(cap) = cap {
            select = select.limit(cap);
        }

        let stories = select.all(self.conn).await?;
        if stories.is_empty() {
            return Ok(Vec::new());
        }

        let story_ids: Vec<i32> = stories.iter().map(|s| s.id).collect();
        let mut media = load_media_by_story(self.conn, &story_ids).await?;

        let mut agent_ids: Vec<i32> = stories.iter().map(|s| s.agent_id).collect();
        agent_ids.sort_unstable();
        agent_ids.dedup();
        let publishers: HashMap<i32, agent::Model> = agent::Entity::find()
            .filter(agent::Column::Id.is_in(agent_ids))
            .all(self.conn)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        Ok(flatten(stories, &mut media, &publishers))
    }
}

/// Expand stories into one row per media item, keeping story order and
/// media position order.
fn flatten(
    stories: Vec<story::Model>,
    media: &mut HashMap<i32, Vec<story_media::Model>>,
    publishers: &HashMap<i32, agent::Model>,
) -> Vec<FeedItem> {
    let mut items = Vec::new();
    for story in stories {
        let Some(agent) = publishers.get(&story.agent_id) else {
            continue;
        };
        let publisher = FeedPublisher {
            id: agent.id,
            name: agent.name.clone(),
            avatar_url: agent.avatar_url.clone(),
        };
        for m in media.remove(&story.id).unwrap_or_default() {
            items.push(FeedItem {
                story_id: story.id,
                publisher: publisher.clone(),
                title: story.title.clone(),
                caption: story.caption.clone(),
                project_name: story.project_name.clone(),
                created_at: story.created_at,
                expires_at: story.expires_at,
                media: FeedMedia {
                    id: m.id,
                    kind: m.kind,
                    url: m.url,
                    thumbnail_url: m.thumbnail_url,
                    duration_secs: m.duration_secs,
                    position: m.position,
                },
            });
        }
    }
    items
}

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use common::MediaKind;
use common::storage::{MediaKey, MediaReader, MediaStore, StorageError};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use tokio::io::BufReader;
use tracing::{debug, info, warn};

use crate::config::StoryConfig;
use crate::entity::{agent, story, story_media, story_view};

use super::StoryError;

const MAX_TITLE_CHARS: usize = 256;
const MAX_CAPTION_CHARS: usize = 2_000;

/// One media item to attach to a new story, in display order.
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub kind: MediaKind,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub duration_secs: Option<i32>,
    /// Set when the file lives in our media store.
    pub blob_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewStory {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub project_name: Option<String>,
    /// `None` uses the configured default.
    pub ttl_secs: Option<i64>,
    pub media: Vec<NewMedia>,
}

/// An upload spooled to a local file, waiting to be written to the media store.
#[derive(Debug, Clone)]
pub struct StagedBlob {
    pub key: MediaKey,
    pub path: PathBuf,
}

/// A story with its media, ordered by position.
#[derive(Debug, Clone)]
pub struct StoryWithMedia {
    pub story: story::Model,
    pub media: Vec<story_media::Model>,
}

/// Resolve the effective TTL: the default when absent, rejected when not
/// positive, clamped to the configured maximum.
pub fn resolve_ttl(requested: Option<i64>, config: &StoryConfig) -> Result<i64, StoryError> {
    let ttl = requested.unwrap_or(config.default_ttl_secs);
    if ttl <= 0 {
        return Err(StoryError::Validation(format!(
            "ttl_secs must be positive, got {ttl}"
        )));
    }
    Ok(ttl.min(config.max_ttl_secs))
}

fn normalize_text(
    value: Option<String>,
    field: &str,
    max_chars: usize,
) -> Result<Option<String>, StoryError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_chars {
        return Err(StoryError::Validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

pub fn validate_media(media: &[NewMedia], max_items: usize) -> Result<(), StoryError> {
    if media.is_empty() {
        return Err(StoryError::Validation(
            "A story needs at least one media item".into(),
        ));
    }
    if media.len() > max_items {
        return Err(StoryError::Validation(format!(
            "A story can hold at most {max_items} media items"
        )));
    }
    for (i, item) in media.iter().enumerate() {
        if item.url.trim().is_empty() {
            return Err(StoryError::Validation(format!("Media {i} has no URL")));
        }
        if let Some(d) = item.duration_secs
            && d <= 0
        {
            return Err(StoryError::Validation(format!(
                "Media {i} has an invalid duration: {d}"
            )));
        }
    }
    Ok(())
}

pub struct StoryService<'a, C> {
    conn: &'a C,
    config: &'a StoryConfig,
}

impl<'a, C: ConnectionTrait + TransactionTrait> StoryService<'a, C> {
    pub fn new(conn: &'a C, config: &'a StoryConfig) -> Self {
        Self { conn, config }
    }

    /// The publisher profile linked to an account.
    pub async fn agent_for_user(&self, user_id: i32) -> Result<agent::Model, StoryError> {
        agent::Entity::find()
            .filter(agent::Column::UserId.eq(user_id))
            .one(self.conn)
            .await?
            .ok_or_else(|| {
                StoryError::Validation("No agent profile is linked to this account".into())
            })
    }

    /// Insert a story and all of its media in one transaction.
    pub async fn create_story(
        &self,
        user_id: i32,
        new: NewStory,
        now: DateTime<Utc>,
    ) -> Result<StoryWithMedia, StoryError> {
        self.insert_story(user_id, new, now, None).await
    }

    /// Like [`Self::create_story`], but first writes `blobs` to `store`.
    ///
    /// Each blob key stays locked from the write until commit, so a concurrent
    /// [`release_blobs`] either finishes before the write or sees the new rows.
    pub async fn create_story_with_blobs(
        &self,
        user_id: i32,
        new: NewStory,
        now: DateTime<Utc>,
        store: &dyn MediaStore,
        blobs: &[StagedBlob],
    ) -> Result<StoryWithMedia, StoryError> {
        self.insert_story(user_id, new, now, Some((store, blobs)))
            .await
    }

    async fn insert_story(
        &self,
        user_id: i32,
        new: NewStory,
        now: DateTime<Utc>,
        uploads: Option<(&dyn MediaStore, &[StagedBlob])>,
    ) -> Result<StoryWithMedia, StoryError> {
        validate_media(&new.media, self.config.max_media_per_story)?;
        let ttl = resolve_ttl(new.ttl_secs, self.config)?;
        let title = normalize_text(new.title, "title", MAX_TITLE_CHARS)?;
        let caption = normalize_text(new.caption, "caption", MAX_CAPTION_CHARS)?;
        let project_name = normalize_text(new.project_name, "project_name", MAX_TITLE_CHARS)?;

        let agent = self.agent_for_user(user_id).await?;

        let txn = self.conn.begin().await?;

        if let Some((store, blobs)) = uploads {
            let keys: BTreeSet<String> = blobs.iter().map(|b| b.key.to_string()).collect();
            for key in &keys {
                lock_blob(&txn, key).await?;
            }
            for blob in blobs {
                write_staged(store, blob).await?;
            }
        }

        let story = story::ActiveModel {
            agent_id: Set(agent.id),
            title: Set(title),
            caption: Set(caption),
            project_name: Set(project_name),
            is_active: Set(true),
            expires_at: Set(now + Duration::seconds(ttl)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut media = Vec::with_capacity(new.media.len());
        for (position, item) in new.media.into_iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoryError::Validation("Too many media items".into()))?;
            let row = story_media::ActiveModel {
                story_id: Set(story.id),
                kind: Set(item.kind),
                url: Set(item.url.trim().to_string()),
                thumbnail_url: Set(item.thumbnail_url.filter(|u| !u.trim().is_empty())),
                duration_secs: Set(item.duration_secs),
                position: Set(position),
                blob_key: Set(item.blob_key),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            media.push(row);
        }

        txn.commit().await?;

        info!(
            story_id = story.id,
            agent_id = agent.id,
            media = media.len(),
            ttl_secs = ttl,
            "Story published"
        );

        Ok(StoryWithMedia { story, media })
    }

    /// Fetch a story regardless of visibility.
    pub async fn get_by_id(&self, story_id: i32) -> Result<StoryWithMedia, StoryError> {
        let story = story::Entity::find_by_id(story_id)
            .one(self.conn)
            .await?
            .ok_or_else(|| not_found(story_id))?;
        let mut media = self.load_media(&[story.id]).await?;
        Ok(StoryWithMedia {
            media: media.remove(&story.id).unwrap_or_default(),
            story,
        })
    }

    /// All stories of a publisher, newest first, regardless of visibility.
    pub async fn list_by_publisher(
        &self,
        agent_id: i32,
    ) -> Result<Vec<StoryWithMedia>, StoryError> {
        let stories = story::Entity::find()
            .filter(story::Column::AgentId.eq(agent_id))
            .order_by_desc(story::Column::CreatedAt)
            .order_by_desc(story::Column::Id)
            .all(self.conn)
            .await?;
        let ids: Vec<i32> = stories.iter().map(|s| s.id).collect();
        let mut media = self.load_media(&ids).await?;
        Ok(stories
            .into_iter()
            .map(|story| StoryWithMedia {
                media: media.remove(&story.id).unwrap_or_default(),
                story,
            })
            .collect())
    }

    /// Fail unless `user_id` owns `story`.
    pub async fn ensure_owner(&self, story: &story::Model, user_id: i32) -> Result<(), StoryError> {
        let owns = agent::Entity::find_by_id(story.agent_id)
            .one(self.conn)
            .await?
            .is_some_and(|a| a.user_id == user_id);
        if owns {
            Ok(())
        } else {
            Err(StoryError::Forbidden(story.id))
        }
    }

    /// Delete a story owned by `user_id`, with its views and media. Blobs that
    /// no other media row references are removed after commit, best-effort.
    pub async fn delete_story(
        &self,
        store: &dyn MediaStore,
        story_id: i32,
        user_id: i32,
    ) -> Result<(), StoryError> {
        let txn = self.conn.begin().await?;

        let story = story::Entity::find_by_id(story_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| not_found(story_id))?;

        let owner = agent::Entity::find_by_id(story.agent_id).one(&txn).await?;
        if !owner.is_some_and(|a| a.user_id == user_id) {
            return Err(StoryError::Forbidden(story_id));
        }

        let blob_keys: Vec<String> = story_media::Entity::find()
            .select_only()
            .column(story_media::Column::BlobKey)
            .filter(story_media::Column::StoryId.eq(story_id))
            .filter(story_media::Column::BlobKey.is_not_null())
            .into_tuple::<Option<String>>()
            .all(&txn)
            .await?
            .into_iter()
            .flatten()
            .collect();

        story_view::Entity::delete_many()
            .filter(story_view::Column::StoryId.eq(story_id))
            .exec(&txn)
            .await?;
        story_media::Entity::delete_many()
            .filter(story_media::Column::StoryId.eq(story_id))
            .exec(&txn)
            .await?;
        story::Entity::delete_by_id(story_id).exec(&txn).await?;

        txn.commit().await?;

        info!(story_id, agent_id = story.agent_id, "Story deleted");

        release_blobs(self.conn, store, blob_keys).await;
        Ok(())
    }

    async fn load_media(
        &self,
        story_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<story_media::Model>>, StoryError> {
        load_media_by_story(self.conn, story_ids).await
    }
}

fn not_found(story_id: i32) -> StoryError {
    StoryError::NotFound(format!("Story {story_id} not found"))
}

/// Media rows for the given stories, grouped by story and ordered by position.
pub(crate) async fn load_media_by_story<C: ConnectionTrait>(
    conn: &C,
    story_ids: &[i32],
) -> Result<HashMap<i32, Vec<story_media::Model>>, StoryError> {
    let mut grouped: HashMap<i32, Vec<story_media::Model>> = HashMap::new();
    if story_ids.is_empty() {
        return Ok(grouped);
    }
    let rows = story_media::Entity::find()
        .filter(story_media::Column::StoryId.is_in(story_ids.iter().copied()))
        .order_by_asc(story_media::Column::StoryId)
        .order_by_asc(story_media::Column::Position)
        .all(conn)
        .await?;
    for row in rows {
        grouped.entry(row.story_id).or_default().push(row);
    }
    Ok(grouped)
}

/// Take the transaction-scoped lock that serialises writes and releases of
/// one blob key. Held until the surrounding transaction ends.
pub async fn lock_blob<C: ConnectionTrait>(conn: &C, blob_key: &str) -> Result<(), DbErr> {
    conn.execute_raw(Statement::from_sql_and_values(
        conn.get_database_backend(),
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        [blob_key.into()],
    ))
    .await?;
    Ok(())
}

async fn write_staged(store: &dyn MediaStore, blob: &StagedBlob) -> Result<(), StoryError> {
    let file = tokio::fs::File::open(&blob.path)
        .await
        .map_err(StorageError::from)?;
    let reader: MediaReader = Box::new(BufReader::new(file));
    let stored = store.put_stream(reader, blob.key.extension()).await?;
    if stored != blob.key {
        return Err(StorageError::Io(std::io::Error::other(format!(
            "spooled upload changed: expected {}, stored {stored}",
            blob.key
        )))
        .into());
    }
    Ok(())
}

/// Delete stored blobs that no media row references any more.
///
/// Keys are content hashes, so the same blob can back several stories. Each
/// check and delete runs under [`lock_blob`]. Failures are logged and swallowed.
pub async fn release_blobs<C: ConnectionTrait + TransactionTrait>(
    conn: &C,
    store: &dyn MediaStore,
    keys: impl IntoIterator<Item = String>,
) {
    let keys: BTreeSet<String> = keys.into_iter().collect();
    for raw in keys {
        if let Err(e) = release_blob(conn, store, &raw).await {
            warn!(blob_key = %raw, error = %e, "Failed to release media blob");
        }
    }
}

async fn release_blob<C: ConnectionTrait + TransactionTrait>(
    conn: &C,
    store: &dyn MediaStore,
    raw: &str,
) -> Result<(), StoryError> {
    let key: MediaKey = raw.parse()?;

    let txn = conn.begin().await?;
    lock_blob(&txn, raw).await?;
    let refs = story_media::Entity::find()
        .filter(story_media::Column::BlobKey.eq(raw))
        .count(&txn)
        .await?;
    if refs == 0 && store.delete(&key).await? {
        debug!(blob_key = %raw, "Released unreferenced media blob");
    }
    txn.commit().await?;
    Ok(())
}

use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::storage::MediaKey;
use common::{FeedResponse, MediaKind};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AuthUser, STORY_PUBLISH};
use crate::extractors::json::AppJson;
use crate::extractors::viewer::ViewerFingerprint;
use crate::models::story::*;
use crate::state::AppState;
use crate::stories::{
    FeedFilter, FeedService, NewMedia, NewStory, StagedBlob, StoryService, ViewTracker,
    ViewerIdentity, release_blobs,
};

/// Uploads may carry several media files; each is still bounded by
/// `storage.max_blob_size`.
pub fn upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(256 * 1024 * 1024) // 256 MB
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Stories",
    operation_id = "createStory",
    summary = "Publish a story",
    description = "Publishes a story from already-hosted media URLs. Requires `story:publish` \
        and an agent profile linked to the account. The story and all media rows are written \
        in one transaction.",
    request_body = CreateStoryRequest,
    responses(
        (status = 201, description = "Story created", body = StoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 503, description = "Store unavailable (STORE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn create_story(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateStoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission(STORY_PUBLISH)?;

    let now = state.clock.now();
    let created = StoryService::new(&state.db, &state.config.stories)
        .create_story(auth_user.user_id, payload.into(), now)
        .await?;

    Ok((StatusCode::CREATED, Json(StoryResponse::new(created, now))))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Stories",
    operation_id = "uploadStory",
    summary = "Publish a story from uploaded files",
    description = "Multipart form with one or more `file` parts (image/* or video/*) and \
        optional `title`, `caption`, `project_name`, `ttl_secs` and `duration_secs` fields. \
        Files are kept in the media store and served under `/api/v1/media/{key}`.",
    request_body(content_type = "multipart/form-data", description = "Media files with story metadata"),
    responses(
        (status = 201, description = "Story created", body = StoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_story(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission(STORY_PUBLISH)?;

    let mut form = UploadForm::default();
    let read = read_upload_form(&state, &mut multipart, &mut form).await;
    let result = match read {
        Ok(()) => {
            let now = state.clock.now();
            let story = form.take_story();
            let created = StoryService::new(&state.db, &state.config.stories)
                .create_story_with_blobs(
                    auth_user.user_id,
                    story,
                    now,
                    &*state.media_store,
                    &form.staged,
                )
                .await;
            match created {
                Ok(created) => Ok(StoryResponse::new(created, now)),
                Err(e) => {
                    // Written blobs may now be unreferenced.
                    let keys = form.staged.iter().map(|b| b.key.to_string());
                    release_blobs(&state.db, &*state.media_store, keys).await;
                    Err(AppError::from(e))
                }
            }
        }
        Err(e) => Err(e),
    };

    form.discard_spool().await;
    result.map(|response| (StatusCode::CREATED, Json(response)))
}

#[derive(Default)]
struct UploadForm {
    story: NewStory,
    /// Applied to every uploaded file.
    duration_secs: Option<i32>,
    /// Spooled files, not yet in the media store.
    staged: Vec<StagedBlob>,
}

impl UploadForm {
    fn take_story(&mut self) -> NewStory {
        let mut story = std::mem::take(&mut self.story);
        for item in &mut story.media {
            item.duration_secs = self.duration_secs;
        }
        story
    }

    async fn discard_spool(&self) {
        for blob in &self.staged {
            let _ = tokio::fs::remove_file(&blob.path).await;
        }
    }
}

async fn read_upload_form(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let kind = field_kind(&field)?;
                let extension = field_extension(&field);
                let staged =
                    spool_field(field, &extension, state.config.storage.max_blob_size).await?;
                let key = staged.key.to_string();
                form.staged.push(staged);
                form.story.media.push(NewMedia {
                    kind,
                    url: format!(
                        "{}/{}",
                        state.config.storage.public_path.trim_end_matches('/'),
                        key
                    ),
                    thumbnail_url: None,
                    duration_secs: None,
                    blob_key: Some(key),
                });
            }
            "title" => form.story.title = Some(text_field(field, &name).await?),
            "caption" => form.story.caption = Some(text_field(field, &name).await?),
            "project_name" => form.story.project_name = Some(text_field(field, &name).await?),
            "ttl_secs" => {
                let raw = text_field(field, &name).await?;
                form.story.ttl_secs = Some(raw.trim().parse().map_err(|_| {
                    AppError::Validation(format!("ttl_secs must be an integer, got '{raw}'"))
                })?);
            }
            "duration_secs" => {
                let raw = text_field(field, &name).await?;
                form.duration_secs = Some(raw.trim().parse().map_err(|_| {
                    AppError::Validation(format!("duration_secs must be an integer, got '{raw}'"))
                })?);
            }
            _ => {} // Ignore unknown fields.
        }
    }
    Ok(())
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read {name}: {e}")))
}

fn field_mime(field: &axum::extract::multipart::Field<'_>) -> String {
    let guessed = field
        .file_name()
        .and_then(|f| mime_guess::from_path(f).first());
    field
        .content_type()
        .map(|s| s.to_string())
        .filter(|s| s != "application/octet-stream")
        .or_else(|| guessed.as_ref().map(|m| m.to_string()))
        .unwrap_or_default()
}

fn field_kind(field: &axum::extract::multipart::Field<'_>) -> Result<MediaKind, AppError> {
    let mime = field_mime(field);
    MediaKind::from_mime(&mime).ok_or_else(|| {
        AppError::Validation(format!(
            "Unsupported media type '{mime}': only images and videos are accepted"
        ))
    })
}

fn field_extension(field: &axum::extract::multipart::Field<'_>) -> String {
    extension_for(field.file_name(), &field_mime(field))
}

/// The file name's extension when it is usable as a key suffix, otherwise the
/// first extension registered for `mime`.
fn extension_for(file_name: Option<&str>, mime: &str) -> String {
    file_name
        .and_then(|f| std::path::Path::new(f).extension())
        .and_then(|e| e.to_str())
        .filter(|e| MediaKey::is_canonical_extension(e))
        .map(str::to_string)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(mime)
                .and_then(|exts| exts.first())
                .map(|e| e.to_string())
        })
        .unwrap_or_default()
}

/// Stream one file part (bounded by `storage.max_blob_size`) to a temp file,
/// hashing it on the way.
async fn spool_field(
    mut field: axum::extract::multipart::Field<'_>,
    extension: &str,
    max_size: u64,
) -> Result<StagedBlob, AppError> {
    let path = std::env::temp_dir().join(format!("estate-upload-{}", Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?
        {
            size += chunk.len() as u64;
            if size > max_size {
                return Err(AppError::Validation(format!(
                    "Media exceeds the {max_size} byte limit"
                )));
            }
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
        }
        if size == 0 {
            return Err(AppError::Validation("Uploaded file is empty".into()));
        }
        file.flush()
            .await
            .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;

        Ok(MediaKey::from_digest(hasher.finalize().into(), extension)?)
    }
    .await;

    match result {
        Ok(key) => Ok(StagedBlob { key, path }),
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Stories",
    operation_id = "getFeed",
    summary = "Active story feed",
    description = "Visible stories, newest first, one entry per media item in ascending \
        position. Group entries by `story_id` in the order they appear; do not sort again. \
        Capped at `stories.feed_cap` stories.",
    params(FeedQuery),
    responses(
        (status = 200, description = "Feed", body = FeedResponse),
        (status = 503, description = "Store unavailable (STORE_UNAVAILABLE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let filter = FeedFilter {
        locale: query.locale,
        agent_id: None,
    };
    let data = FeedService::new(&state.db)
        .active_feed(state.clock.now(), &filter, state.config.stories.feed_cap)
        .await?;
    Ok(Json(FeedResponse { data }))
}

#[utoipa::path(
    get,
    path = "/publisher/{id}",
    tag = "Stories",
    operation_id = "getPublisherFeed",
    summary = "A publisher's active stories",
    params(("id" = i32, Path, description = "Agent ID")),
    responses(
        (status = 200, description = "Feed", body = FeedResponse),
    ),
)]
#[instrument(skip(state), fields(agent_id))]
pub async fn get_publisher_feed(
    State(state): State<AppState>,
    Path(agent_id): Path<i32>,
) -> Result<Json<FeedResponse>, AppError> {
    let data = FeedService::new(&state.db)
        .active_feed_for_publisher(state.clock.now(), agent_id)
        .await?;
    Ok(Json(FeedResponse { data }))
}

#[utoipa::path(
    get,
    path = "/publisher/me",
    tag = "Stories",
    operation_id = "getMyFeed",
    summary = "The caller's active stories",
    description = "Same visibility rules as the public feed: expired stories do not appear.",
    responses(
        (status = 200, description = "Feed", body = FeedResponse),
        (status = 400, description = "No linked agent profile (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_my_feed(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<FeedResponse>, AppError> {
    let agent = StoryService::new(&state.db, &state.config.stories)
        .agent_for_user(auth_user.user_id)
        .await?;
    let data = FeedService::new(&state.db)
        .active_feed_for_publisher(state.clock.now(), agent.id)
        .await?;
    Ok(Json(FeedResponse { data }))
}

#[utoipa::path(
    get,
    path = "/mine",
    tag = "Stories",
    operation_id = "listMyStories",
    summary = "All of the caller's stories",
    description = "Every story of the caller's agent profile, newest first, including expired \
        and deactivated ones.",
    responses(
        (status = 200, description = "Stories", body = StoryListResponse),
        (status = 400, description = "No linked agent profile (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_my_stories(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<StoryListResponse>, AppError> {
    let service = StoryService::new(&state.db, &state.config.stories);
    let agent = service.agent_for_user(auth_user.user_id).await?;
    let stories = service.list_by_publisher(agent.id).await?;

    let now = state.clock.now();
    Ok(Json(StoryListResponse {
        data: stories
            .into_iter()
            .map(|s| StoryResponse::new(s, now))
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Stories",
    operation_id = "getStory",
    summary = "Get one of the caller's stories",
    description = "Returned regardless of expiry. Only the owning publisher may read it.",
    params(("id" = i32, Path, description = "Story ID")),
    responses(
        (status = 200, description = "Story", body = StoryResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Story not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn get_story(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<StoryResponse>, AppError> {
    let service = StoryService::new(&state.db, &state.config.stories);
    let found = service.get_by_id(id).await?;
    service.ensure_owner(&found.story, auth_user.user_id).await?;

    Ok(Json(StoryResponse::new(found, state.clock.now())))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Stories",
    operation_id = "deleteStory",
    summary = "Delete a story",
    description = "Deletes the story with its media and views. Uploaded files no other story \
        uses are removed afterwards; failures there are logged, not reported.",
    params(("id" = i32, Path, description = "Story ID")),
    responses(
        (status = 204, description = "Story deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Story not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_story(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    StoryService::new(&state.db, &state.config.stories)
        .delete_story(&*state.media_store, id, auth_user.user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/views",
    tag = "Story Views",
    operation_id = "recordView",
    summary = "Record a view",
    description = "Counts at most one view per viewer. Authenticated callers are identified by \
        account, anonymous callers by network address. Only visible stories accept views.",
    params(("id" = i32, Path, description = "Story ID")),
    responses(
        (status = 200, description = "Current view count", body = ViewCountResponse),
        (status = 400, description = "Viewer could not be identified (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Malformed token (TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Story not found or expired (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, fingerprint), fields(id))]
pub async fn record_view(
    auth_user: Option<AuthUser>,
    ViewerFingerprint(fingerprint): ViewerFingerprint,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ViewCountResponse>, AppError> {
    let viewer = ViewerIdentity::resolve(auth_user.map(|u| u.user_id), fingerprint)
        .ok_or_else(|| AppError::Validation("Viewer could not be identified".into()))?;

    let views = ViewTracker::new(&state.db)
        .record_view(id, &viewer, state.clock.now())
        .await?;

    Ok(Json(ViewCountResponse {
        story_id: id,
        views,
    }))
}

#[utoipa::path(
    get,
    path = "/{id}/views",
    tag = "Story Views",
    operation_id = "countViews",
    summary = "View count of one of the caller's stories",
    params(("id" = i32, Path, description = "Story ID")),
    responses(
        (status = 200, description = "View count", body = ViewCountResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Story not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn count_views(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ViewCountResponse>, AppError> {
    let service = StoryService::new(&state.db, &state.config.stories);
    let found = service.get_by_id(id).await?;
    service.ensure_owner(&found.story, auth_user.user_id).await?;

    let views = ViewTracker::new(&state.db).count_views(id).await?;
    Ok(Json(ViewCountResponse {
        story_id: id,
        views,
    }))
}

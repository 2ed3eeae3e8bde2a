use std::time::Duration;

use reqwest::multipart::{Form, Part};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set, TransactionTrait};

use ::common::MediaKind;
use ::common::storage::{MediaKey, MediaStore};
use server::entity::{story, story_media};
use server::stories::{lock_blob, release_blobs};

use crate::common::{TestApp, routes};

const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg-payload";
const MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42fake-video";

fn file(bytes: &[u8], name: &str, mime: &str) -> Part {
    Part::bytes(bytes.to_vec())
        .file_name(name.to_string())
        .mime_str(mime)
        .expect("valid MIME type")
}

#[tokio::test]
async fn upload_creates_story_and_serves_media() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;

    let form = Form::new()
        .text("title", "Kitchen tour")
        .text("ttl_secs", "3600")
        .text("duration_secs", "7")
        .part("file", file(JPEG, "kitchen.jpg", "image/jpeg"))
        .part("file", file(MP4, "walkthrough.mp4", "video/mp4"));

    let res = app.upload_with_token(form, &jane.token).await;
    assert_eq!(res.status, 201, "{}", res.text);
    assert_eq!(res.body["title"], "Kitchen tour");

    let media = res.body["media"].as_array().unwrap();
    assert_eq!(media.len(), 2);
    assert_eq!(media[0]["kind"], "image");
    assert_eq!(media[1]["kind"], "video");
    assert_eq!(media[0]["duration_secs"], 7);

    let url = media[0]["url"].as_str().unwrap();
    assert!(url.starts_with("/api/v1/media/"), "{url}");
    assert!(url.ends_with(".jpg"), "{url}");

    let (status, content_type, bytes) = app.get_bytes(url).await;
    assert_eq!(status, 200);
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(bytes, JPEG);
}

#[tokio::test]
async fn upload_rejects_non_media_files_and_cleans_up() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;

    let form = Form::new()
        .part("file", file(JPEG, "ok.jpg", "image/jpeg"))
        .part("file", file(b"%PDF-1.7", "brochure.pdf", "application/pdf"));

    let res = app.upload_with_token(form, &jane.token).await;
    assert_eq!(res.status, 400, "{}", res.text);
    assert_eq!(story::Entity::find().count(&app.db).await.unwrap(), 0);

    let key = MediaKey::compute(JPEG, "jpg").unwrap();
    assert!(!app.media_store.exists(&key).await.unwrap());
}

#[tokio::test]
async fn upload_without_files_is_rejected() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;

    let res = app
        .upload_with_token(Form::new().text("title", "No files"), &jane.token)
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn deleting_story_removes_unshared_blobs_only() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;

    let shared = || file(JPEG, "same.jpg", "image/jpeg");
    let first = app
        .upload_with_token(Form::new().part("file", shared()), &jane.token)
        .await;
    let second = app
        .upload_with_token(
            Form::new()
                .part("file", shared())
                .part("file", file(MP4, "only.mp4", "video/mp4")),
            &jane.token,
        )
        .await;
    assert_eq!(first.status, 201);
    assert_eq!(second.status, 201);

    let jpeg_key = MediaKey::compute(JPEG, "jpg").unwrap();
    let mp4_key = MediaKey::compute(MP4, "mp4").unwrap();

    let res = app
        .delete_with_token(&routes::story(second.id()), &jane.token)
        .await;
    assert_eq!(res.status, 204);
    assert!(app.media_store.exists(&jpeg_key).await.unwrap());
    assert!(!app.media_store.exists(&mp4_key).await.unwrap());

    let res = app
        .delete_with_token(&routes::story(first.id()), &jane.token)
        .await;
    assert_eq!(res.status, 204);
    assert!(!app.media_store.exists(&jpeg_key).await.unwrap());
}

#[tokio::test]
async fn release_waits_for_uncommitted_write_of_same_blob() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let id = app.create_story(&jane, &[5], 3600).await;

    let key = app.media_store.put(JPEG, "jpg").await.unwrap();
    let raw = key.to_string();

    // An upload that has written the blob but not committed its media row.
    let txn = app.db.begin().await.unwrap();
    lock_blob(&txn, &raw).await.unwrap();

    let release = {
        let db = app.db.clone();
        let store = app.media_store.clone();
        let raw = raw.clone();
        tokio::spawn(async move { release_blobs(&db, &*store, [raw]).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!release.is_finished());
    assert!(app.media_store.exists(&key).await.unwrap());

    story_media::ActiveModel {
        story_id: Set(id),
        kind: Set(MediaKind::Image),
        url: Set(format!("/api/v1/media/{raw}")),
        thumbnail_url: Set(None),
        duration_secs: Set(None),
        position: Set(1),
        blob_key: Set(Some(raw.clone())),
        created_at: Set(app.clock_now()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .unwrap();
    txn.commit().await.unwrap();

    release.await.unwrap();
    assert!(app.media_store.exists(&key).await.unwrap());
    let (status, _, bytes) = app.get_bytes(&format!("/api/v1/media/{raw}")).await;
    assert_eq!(status, 200);
    assert_eq!(bytes, JPEG);
}

#[tokio::test]
async fn reupload_after_release_restores_blob() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let upload = || Form::new().part("file", file(JPEG, "again.jpg", "image/jpeg"));

    let first = app.upload_with_token(upload(), &jane.token).await;
    assert_eq!(first.status, 201, "{}", first.text);
    let res = app
        .delete_with_token(&routes::story(first.id()), &jane.token)
        .await;
    assert_eq!(res.status, 204);
    let key = MediaKey::compute(JPEG, "jpg").unwrap();
    assert!(!app.media_store.exists(&key).await.unwrap());

    let second = app.upload_with_token(upload(), &jane.token).await;
    assert_eq!(second.status, 201, "{}", second.text);
    let url = second.body["media"][0]["url"].as_str().unwrap().to_string();
    let (status, _, bytes) = app.get_bytes(&url).await;
    assert_eq!(status, 200);
    assert_eq!(bytes, JPEG);
}

#[tokio::test]
async fn unknown_or_malformed_media_key() {
    let app = TestApp::spawn().await;

    let missing = MediaKey::compute(b"never stored", "png").unwrap();
    let (status, _, _) = app.get_bytes(&format!("/api/v1/media/{missing}")).await;
    assert_eq!(status, 404);

    let (status, _, _) = app.get_bytes("/api/v1/media/not-a-key").await;
    assert_eq!(status, 400);
}

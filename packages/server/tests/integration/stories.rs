use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

use server::entity::{story, story_media};

use crate::common::{TestApp, routes};

mod create_story {
    use super::*;

    #[tokio::test]
    async fn publisher_creates_story_with_ordered_media() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane Realtor", Some("en")).await;

        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({
                    "title": "  Sunny loft  ",
                    "caption": "Two bedrooms, river view",
                    "project_name": "Riverside",
                    "ttl_secs": 3600,
                    "media": [
                        {"kind": "image", "url": "https://cdn.example.com/a.jpg", "duration_secs": 5},
                        {"kind": "video", "url": "https://cdn.example.com/b.mp4",
                         "thumbnail_url": "https://cdn.example.com/b.jpg"},
                        {"kind": "image", "url": "https://cdn.example.com/c.jpg", "duration_secs": 10},
                    ],
                }),
                &publisher.token,
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["title"], "Sunny loft");
        assert_eq!(res.body["agent_id"], publisher.agent_id);
        assert_eq!(res.body["is_active"], true);
        assert_eq!(res.body["is_visible"], true);

        let media = res.body["media"].as_array().unwrap();
        let positions: Vec<i64> = media.iter().map(|m| m["position"].as_i64().unwrap()).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(media[1]["kind"], "video");
        assert_eq!(media[1]["duration_secs"], serde_json::Value::Null);

        let created = story::Entity::find_by_id(res.id())
            .one(&app.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            created.expires_at,
            app.clock_now() + chrono::Duration::seconds(3600)
        );
    }

    #[tokio::test]
    async fn ttl_above_maximum_is_clamped() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;

        let id = app.create_story(&publisher, &[5], 7 * 86_400).await;

        let created = story::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();
        assert_eq!(
            created.expires_at - created.created_at,
            chrono::Duration::seconds(86_400)
        );
    }

    #[tokio::test]
    async fn missing_ttl_uses_default() {
        let app = TestApp::spawn_with(server::config::StoryConfig {
            default_ttl_secs: 600,
            ..Default::default()
        })
        .await;
        let publisher = app.create_publisher("Jane", None).await;

        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({"media": [{"kind": "image", "url": "https://cdn.example.com/a.jpg"}]}),
                &publisher.token,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);

        let created = story::Entity::find_by_id(res.id())
            .one(&app.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            created.expires_at - created.created_at,
            chrono::Duration::seconds(600)
        );
    }

    #[tokio::test]
    async fn empty_media_is_rejected_and_nothing_is_stored() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;

        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({"title": "Nothing to see", "media": []}),
                &publisher.token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert_eq!(story::Entity::find().count(&app.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_duration_and_ttl_are_rejected() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;

        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({"media": [{"kind": "image", "url": "https://cdn.example.com/a.jpg", "duration_secs": 0}]}),
                &publisher.token,
            )
            .await;
        assert_eq!(res.status, 400);

        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({"ttl_secs": 0, "media": [{"kind": "image", "url": "https://cdn.example.com/a.jpg"}]}),
                &publisher.token,
            )
            .await;
        assert_eq!(res.status, 400);

        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({"media": [{"kind": "gif", "url": "https://cdn.example.com/a.gif"}]}),
                &publisher.token,
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn account_without_agent_profile_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token_for(app.new_user_id(), &["story:publish"]);

        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({"media": [{"kind": "image", "url": "https://cdn.example.com/a.jpg"}]}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert!(res.body["message"].as_str().unwrap().contains("agent profile"));
    }

    #[tokio::test]
    async fn publishing_requires_permission_and_token() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;
        let body = json!({"media": [{"kind": "image", "url": "https://cdn.example.com/a.jpg"}]});

        let res = app.post_without_token(routes::STORIES, &body).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");

        let viewer_token = app.token_for(publisher.user_id, &[]);
        let res = app.post_with_token(routes::STORIES, &body, &viewer_token).await;
        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");

        let res = app.post_with_token(routes::STORIES, &body, "not-a-jwt").await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn failed_media_insert_rolls_back_the_story() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;

        // PostgreSQL rejects NUL bytes in text columns, failing the second media insert.
        let res = app
            .post_with_token(
                routes::STORIES,
                &json!({
                    "title": "Half written",
                    "media": [
                        {"kind": "image", "url": "https://cdn.example.com/ok.jpg"},
                        {"kind": "image", "url": "https://cdn.example.com/bad\u{0}.jpg"},
                    ],
                }),
                &publisher.token,
            )
            .await;

        assert_eq!(res.status, 500, "{}", res.text);
        assert_eq!(story::Entity::find().count(&app.db).await.unwrap(), 0);
        assert_eq!(story_media::Entity::find().count(&app.db).await.unwrap(), 0);
    }
}

mod read_story {
    use super::*;

    #[tokio::test]
    async fn owner_reads_expired_story_with_stored_flag() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;
        let id = app.create_story(&publisher, &[5], 60).await;

        app.advance(61);

        let res = app.get_with_token(&routes::story(id), &publisher.token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["is_active"], true);
        assert_eq!(res.body["is_visible"], false);

        app.sweep().await;
        let res = app.get_with_token(&routes::story(id), &publisher.token).await;
        assert_eq!(res.body["is_active"], false);
        assert_eq!(res.body["is_visible"], false);
    }

    #[tokio::test]
    async fn other_publisher_cannot_read_story() {
        let app = TestApp::spawn().await;
        let owner = app.create_publisher("Jane", None).await;
        let other = app.create_publisher("John", None).await;
        let id = app.create_story(&owner, &[5], 60).await;

        let res = app.get_with_token(&routes::story(id), &other.token).await;
        assert_eq!(res.status, 403);

        let res = app.get_with_token(&routes::story(9_999), &owner.token).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn mine_lists_all_own_stories_newest_first() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;
        let other = app.create_publisher("John", None).await;

        let old = app.create_story(&publisher, &[5], 60).await;
        app.advance(120);
        let new = app.create_story(&publisher, &[5, 6], 3600).await;
        app.create_story(&other, &[5], 3600).await;
        app.sweep().await;

        let res = app.get_with_token(routes::MINE, &publisher.token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        let data = res.body["data"].as_array().unwrap();
        let ids: Vec<i64> = data.iter().map(|s| s["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![new as i64, old as i64]);
        assert_eq!(data[0]["media"].as_array().unwrap().len(), 2);
        assert_eq!(data[1]["is_active"], false);
    }
}

mod delete_story {
    use super::*;

    #[tokio::test]
    async fn owner_deletes_story_with_media_and_views() {
        let app = TestApp::spawn().await;
        let publisher = app.create_publisher("Jane", None).await;
        let id = app.create_story(&publisher, &[5, 10], 3600).await;
        let res = app.post_from(&routes::views(id), "203.0.113.7").await;
        assert_eq!(res.status, 200, "{}", res.text);

        let res = app.delete_with_token(&routes::story(id), &publisher.token).await;
        assert_eq!(res.status, 204, "{}", res.text);

        assert!(story::Entity::find_by_id(id).one(&app.db).await.unwrap().is_none());
        let media = story_media::Entity::find()
            .filter(story_media::Column::StoryId.eq(id))
            .count(&app.db)
            .await
            .unwrap();
        assert_eq!(media, 0);

        let res = app.delete_with_token(&routes::story(id), &publisher.token).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn non_owner_cannot_delete_and_story_is_untouched() {
        let app = TestApp::spawn().await;
        let owner = app.create_publisher("Jane", None).await;
        let other = app.create_publisher("John", None).await;
        let id = app.create_story(&owner, &[5, 10], 3600).await;

        let res = app.delete_with_token(&routes::story(id), &other.token).await;
        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");

        assert!(story::Entity::find_by_id(id).one(&app.db).await.unwrap().is_some());
        let media = story_media::Entity::find()
            .filter(story_media::Column::StoryId.eq(id))
            .count(&app.db)
            .await
            .unwrap();
        assert_eq!(media, 2);
    }

    #[tokio::test]
    async fn owner_can_delete_without_publish_permission() {
        let app = TestApp::spawn().await;
        let owner = app.create_publisher("Jane", None).await;
        let id = app.create_story(&owner, &[5], 3600).await;

        let revoked = app.token_for(owner.user_id, &[]);
        let res = app.delete_with_token(&routes::story(id), &revoked).await;
        assert_eq!(res.status, 204, "{}", res.text);
        assert!(story::Entity::find_by_id(id).one(&app.db).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_requires_authentication() {
        let app = TestApp::spawn().await;
        let owner = app.create_publisher("Jane", None).await;
        let id = app.create_story(&owner, &[5], 3600).await;

        let res = app
            .client
            .delete(format!("http://{}{}", app.addr, routes::story(id)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 401);
    }
}

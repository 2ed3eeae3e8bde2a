use crate::common::{TestApp, routes};

#[tokio::test]
async fn repeat_views_by_same_viewer_count_once() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let id = app.create_story(&jane, &[5], 3600).await;

    let first = app.post_from(&routes::views(id), "203.0.113.7").await;
    assert_eq!(first.status, 200, "{}", first.text);
    assert_eq!(first.body["views"], 1);

    let again = app.post_from(&routes::views(id), "203.0.113.7").await;
    assert_eq!(again.body["views"], 1);

    let other = app.post_from(&routes::views(id), "198.51.100.2").await;
    assert_eq!(other.body["views"], 2);

    let res = app.get_with_token(&routes::views(id), &jane.token).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body["views"], 2);
}

#[tokio::test]
async fn authenticated_viewer_is_identified_by_account() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let id = app.create_story(&jane, &[5], 3600).await;
    let viewer = app.token_for(app.new_user_id(), &[]);

    // Same account from two addresses.
    for addr in ["203.0.113.7", "198.51.100.2"] {
        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::views(id)))
            .header("Authorization", format!("Bearer {viewer}"))
            .header("X-Forwarded-For", addr)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);
    }

    let res = app.get_with_token(&routes::views(id), &jane.token).await;
    assert_eq!(res.body["views"], 1);
}

#[tokio::test]
async fn anonymous_viewer_falls_back_to_peer_address() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let id = app.create_story(&jane, &[5], 3600).await;

    let res = app.post_without_token(&routes::views(id), &serde_json::json!({})).await;
    assert_eq!(res.status, 200, "{}", res.text);
    let res = app.post_without_token(&routes::views(id), &serde_json::json!({})).await;
    assert_eq!(res.body["views"], 1);
}

#[tokio::test]
async fn forwarded_headers_cannot_mint_identities_without_a_proxy() {
    let app = TestApp::spawn_direct().await;
    let jane = app.create_publisher("Jane", None).await;
    let id = app.create_story(&jane, &[5], 3600).await;

    for addr in ["203.0.113.7", "198.51.100.2", "192.0.2.44"] {
        let res = app.post_from(&routes::views(id), addr).await;
        assert_eq!(res.status, 200, "{}", res.text);
    }

    let res = app.get_with_token(&routes::views(id), &jane.token).await;
    assert_eq!(res.body["views"], 1);
}

#[tokio::test]
async fn expired_or_missing_story_rejects_views() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let id = app.create_story(&jane, &[5], 60).await;

    app.advance(61);
    let res = app.post_from(&routes::views(id), "203.0.113.7").await;
    assert_eq!(res.status, 404);

    let res = app.post_from(&routes::views(9_999), "203.0.113.7").await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn view_count_is_owner_only() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let john = app.create_publisher("John", None).await;
    let id = app.create_story(&jane, &[5], 3600).await;

    let res = app.get_with_token(&routes::views(id), &john.token).await;
    assert_eq!(res.status, 403);

    let res = app.get_without_token(&routes::views(id)).await;
    assert_eq!(res.status, 401);
}

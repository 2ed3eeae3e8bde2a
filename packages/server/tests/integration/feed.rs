use crate::common::{TestApp, routes};

#[tokio::test]
async fn feed_groups_newest_story_first_with_media_in_position_order() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", Some("en")).await;
    let john = app.create_publisher("John", Some("en")).await;

    let t1 = app.create_story(&jane, &[5, 6], 3600).await;
    app.advance(10);
    let t2 = app.create_story(&john, &[7], 3600).await;
    app.advance(10);
    let t3 = app.create_story(&jane, &[8, 9, 10], 3600).await;

    let res = app.get_without_token(routes::STORIES).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(TestApp::story_order(&res), vec![t3, t2, t1]);

    let data = res.body["data"].as_array().unwrap();
    assert_eq!(data.len(), 6);
    let t3_positions: Vec<i64> = data
        .iter()
        .filter(|i| i["story_id"] == t3)
        .map(|i| i["media"]["position"].as_i64().unwrap())
        .collect();
    assert_eq!(t3_positions, vec![0, 1, 2]);
    assert_eq!(data[3]["publisher"]["name"], "John");
    assert_eq!(data[3]["publisher"]["id"], john.agent_id);
}

#[tokio::test]
async fn expired_story_leaves_feed_before_and_after_sweep() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;

    let id = app.create_story(&jane, &[5, 10], 60).await;
    let res = app.get_without_token(routes::STORIES).await;
    assert_eq!(TestApp::story_order(&res), vec![id]);

    app.advance(61);

    // Derived visibility hides it even before the sweep runs.
    let res = app.get_without_token(routes::STORIES).await;
    assert!(TestApp::story_order(&res).is_empty());

    assert_eq!(app.sweep().await, 1);
    let res = app.get_without_token(routes::STORIES).await;
    assert!(TestApp::story_order(&res).is_empty());

    let res = app.get_with_token(&routes::story(id), &jane.token).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body["is_active"], false);
}

#[tokio::test]
async fn feed_cap_drops_the_oldest_stories() {
    let app = TestApp::spawn_with(server::config::StoryConfig {
        feed_cap: 2,
        ..Default::default()
    })
    .await;
    let jane = app.create_publisher("Jane", None).await;

    let _oldest = app.create_story(&jane, &[5], 3600).await;
    app.advance(1);
    let middle = app.create_story(&jane, &[5, 5], 3600).await;
    app.advance(1);
    let newest = app.create_story(&jane, &[5], 3600).await;

    let res = app.get_without_token(routes::STORIES).await;
    assert_eq!(TestApp::story_order(&res), vec![newest, middle]);
    assert_eq!(res.body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn feed_filters_by_publisher_locale() {
    let app = TestApp::spawn().await;
    let en = app.create_publisher("Jane", Some("en")).await;
    let fr = app.create_publisher("Jeanne", Some("fr")).await;

    let en_story = app.create_story(&en, &[5], 3600).await;
    app.advance(1);
    let fr_story = app.create_story(&fr, &[5], 3600).await;

    let res = app
        .get_without_token(&format!("{}?locale=fr", routes::STORIES))
        .await;
    assert_eq!(TestApp::story_order(&res), vec![fr_story]);

    let res = app
        .get_without_token(&format!("{}?locale=en", routes::STORIES))
        .await;
    assert_eq!(TestApp::story_order(&res), vec![en_story]);
}

#[tokio::test]
async fn publisher_feed_is_scoped_and_has_no_owner_exception() {
    let app = TestApp::spawn().await;
    let jane = app.create_publisher("Jane", None).await;
    let john = app.create_publisher("John", None).await;

    let expiring = app.create_story(&jane, &[5], 30).await;
    app.advance(1);
    let lasting = app.create_story(&jane, &[5], 3600).await;
    app.create_story(&john, &[5], 3600).await;

    let res = app
        .get_without_token(&routes::publisher_feed(jane.agent_id))
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(TestApp::story_order(&res), vec![lasting, expiring]);

    app.advance(60);

    let res = app.get_with_token(routes::MY_FEED, &jane.token).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(TestApp::story_order(&res), vec![lasting]);

    let res = app.get_without_token(routes::MY_FEED).await;
    assert_eq!(res.status, 401);
}

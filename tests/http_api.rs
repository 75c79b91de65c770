mod support;

use axum::http::{Method, StatusCode};
use mixboard::infra::http::PAGE_STATE_HEADER;
use mixboard::regen::{PageKey, PageState};
use serde_json::json;
use support::{KNOWN_EXTERNAL_ID, TestApp, body_json, body_text};
use uuid::Uuid;

async fn create(app: &TestApp, name: &str, external_id: &str) -> serde_json::Value {
    let response = app
        .send(
            Method::POST,
            "/api/playlists",
            Some(json!({ "name": name, "owner": "Ada", "external_id": external_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn create_then_list_returns_entry_with_defaults() {
    let app = TestApp::new();

    let created = create(&app, "Friday Mix", KNOWN_EXTERNAL_ID).await;
    assert_eq!(created["slug"], "friday-mix");
    assert_eq!(created["color"], "#1db954");
    assert_eq!(created["upvotes"], 0);

    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();
    assert!(app.scheduler.is_known(id), "new ids are registered for prerendering");

    let response = app.send(Method::GET, "/api/playlists", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Friday Mix");
}

#[tokio::test]
async fn duplicate_name_is_rejected_with_conflict() {
    let app = TestApp::new();
    create(&app, "Friday Mix", KNOWN_EXTERNAL_ID).await;

    let response = app
        .send(
            Method::POST,
            "/api/playlists",
            Some(json!({ "name": "friday   mix", "owner": "Grace", "external_id": "other" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_text(response).await;
    insta::assert_snapshot!(body, @r#"{"error":{"code":"duplicate_slug","message":"A playlist with this name already exists","hint":"slug `friday-mix` is taken; choose another name"}}"#);
}

#[tokio::test]
async fn invalid_submission_is_a_bad_request() {
    let app = TestApp::new();

    let response = app
        .send(
            Method::POST,
            "/api/playlists",
            Some(json!({ "name": "   ", "owner": "Ada", "external_id": "abc" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_failed");

    let response = app
        .send(
            Method::POST,
            "/api/playlists",
            Some(json!({
                "name": "Colourful",
                "owner": "Ada",
                "external_id": "abc",
                "color": "not-a-colour"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upvotes_reorder_the_list() {
    let app = TestApp::new();
    create(&app, "First", "a1").await;
    let second = create(&app, "Second", "a2").await;
    let second_id = second["id"].as_str().unwrap();

    for expected in 1..=2 {
        let response = app
            .send(
                Method::POST,
                &format!("/api/playlists/{second_id}/upvote"),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["upvotes"], expected);
    }

    let body = body_json(app.send(Method::GET, "/api/playlists?limit=1", None).await).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Second");

    let body = body_json(app.send(Method::GET, "/api/playlists?limit=0", None).await).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let app = TestApp::new();

    let missing = Uuid::new_v4();
    let response = app
        .send(Method::GET, &format!("/api/playlists/{missing}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "not_found");

    let response = app
        .send(Method::POST, &format!("/api/playlists/{missing}/upvote"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(Method::GET, "/api/playlists/not-an-id", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detail_endpoint_joins_entry_with_live_snapshot() {
    let app = TestApp::new();
    let created = create(&app, "Friday Mix", KNOWN_EXTERNAL_ID).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .send(Method::GET, &format!("/api/playlists/{id}/detail"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["playlist"]["slug"], "friday-mix");
    assert_eq!(body["external"]["tracks"][0]["title"], "Opening Night");

    let response = app
        .send(Method::GET, "/api/external/does-not-exist", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_clamps_limit_and_skips_blank_queries() {
    let app = TestApp::new();

    let response = app.send(Method::GET, "/api/search?q=%20%20", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["items"].as_array().unwrap().is_empty());
    assert!(app.provider.searches().is_empty());

    let response = app
        .send(Method::GET, "/api/search?q=jazz&limit=500", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["query"], "jazz");
    assert_eq!(body["items"][0]["name"], "jazz hits");

    app.send(Method::GET, "/api/search?q=jazz", None).await;
    assert_eq!(
        app.provider.searches(),
        vec![("jazz".to_string(), 50), ("jazz".to_string(), 8)]
    );
}

#[tokio::test]
async fn list_page_is_built_on_first_request_and_then_served_fresh() {
    let app = TestApp::new();
    create(&app, "Friday Mix", KNOWN_EXTERNAL_ID).await;
    assert_eq!(app.scheduler.state(PageKey::List), PageState::Unbuilt);

    let response = app.send(Method::GET, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[PAGE_STATE_HEADER], "fresh");
    let html = body_text(response).await;
    assert!(html.contains("Friday Mix"));

    assert_eq!(app.scheduler.state(PageKey::List), PageState::Fresh);
    let response = app.send(Method::GET, "/", None).await;
    assert_eq!(response.headers()[PAGE_STATE_HEADER], "fresh");
}

#[tokio::test]
async fn detail_page_renders_tracks_or_not_found() {
    let app = TestApp::new();
    let created = create(&app, "Friday Mix", KNOWN_EXTERNAL_ID).await;
    let id = created["id"].as_str().unwrap();

    let response = app.send(Method::GET, &format!("/playlist/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Opening Night"));
    assert!(html.contains("3:21"));

    let missing = Uuid::new_v4();
    let response = app
        .send(Method::GET, &format!("/playlist/{missing}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.scheduler.state(PageKey::Detail(missing)),
        PageState::NotFound
    );

    let response = app.send(Method::GET, "/playlist/garbage", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_no_content() {
    let app = TestApp::new();
    let response = app.send(Method::GET, "/_health", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

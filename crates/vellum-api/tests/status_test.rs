//! Status endpoint integration tests.
//!
//! Run with: `cargo test -p vellum-api --test status_test`

mod helpers;

use helpers::fixtures;
use helpers::storage::FailurePlan;
use helpers::{setup_test_app, setup_test_app_with};
use serde_json::Value;
use uuid::Uuid;

async fn upload(app: &helpers::TestApp, user: Uuid, visibility: &str) -> Uuid {
    let visibility = visibility.to_string();
    let response = app
        .upload_form(user, fixtures::create_test_png(32, 32), "a.png", move |form| {
            form.add_text("visibility", visibility)
        })
        .await;
    assert_eq!(response.status_code(), 202);
    let body: Value = response.json();
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_unknown_image_is_not_found() {
    let app = setup_test_app().await;

    let response = app.status(Uuid::new_v4(), Uuid::new_v4()).await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_private_image_is_hidden_from_other_users() {
    let app = setup_test_app_with(|_| {}, FailurePlan::none(), false).await;
    let owner = Uuid::new_v4();
    let id = upload(&app, owner, "private").await;

    assert_eq!(app.status(owner, id).await.status_code(), 200);

    // Indistinguishable from a missing image
    let hidden = app.status(Uuid::new_v4(), id).await;
    assert_eq!(hidden.status_code(), 404);
    let body: Value = hidden.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_public_image_is_visible_to_everyone() {
    let app = setup_test_app_with(|_| {}, FailurePlan::none(), false).await;
    let id = upload(&app, Uuid::new_v4(), "public").await;

    let response = app.status(Uuid::new_v4(), id).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["id"], id.to_string());
    assert_eq!(body["status"], "processing");
}

#[tokio::test]
async fn test_status_requires_user_header() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get(&helpers::api_path(&format!("/images/{}/status", Uuid::new_v4())))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get(&helpers::api_path("/images/not-a-uuid/status"))
        .add_header("x-user-id", Uuid::new_v4().to_string())
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_health_is_ok() {
    let app = setup_test_app().await;

    let response = app.client().get("/health").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");

    let response = app.client().get("/ready").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["database"], "in-memory");
    assert_eq!(body["storage"], "ok");
}

//! Upload gate integration tests.
//!
//! Run with: `cargo test -p vellum-api --test upload_test`

mod helpers;

use axum_test::multipart::MultipartForm;
use helpers::fixtures;
use helpers::storage::FailurePlan;
use helpers::{setup_test_app, setup_test_app_with, TestApp};
use serde_json::Value;
use uuid::Uuid;
use vellum_core::ImageFormatKind;
use vellum_db::ImageRepository;

/// No image row, no job and nothing in storage
async fn assert_no_side_effects(app: &TestApp) {
    assert!(app.images.is_empty().await);
    assert_eq!(app.queue.enqueued_total().await, 0);
    assert_eq!(app.stored_files("originals"), 0);
}

#[tokio::test]
async fn test_upload_is_accepted_as_processing() {
    // Workers stopped so the image cannot finish before we look at it
    let app = setup_test_app_with(|_| {}, FailurePlan::none(), false).await;
    let user = Uuid::new_v4();

    let response = app
        .upload_form(user, fixtures::create_test_png(64, 48), "sunset.png", |form| {
            form.add_text("title", "Sunset")
                .add_text("visibility", "public")
                .add_text("tags", "sky, Evening")
                .add_text("tags", "sky")
        })
        .await;

    assert_eq!(response.status_code(), 202);
    let body: Value = response.json();
    assert_eq!(body["status"], "processing");
    let id = Uuid::parse_str(body["id"].as_str().unwrap()).unwrap();
    assert_eq!(body["status_url"], format!("/api/v0/images/{}/status", id));
    assert_eq!(
        response.header("location").to_str().unwrap(),
        format!("/api/v0/images/{}/status", id)
    );

    let status: Value = app.status(user, id).await.json();
    assert_eq!(status["status"], "processing");
    assert!(status.get("variants").is_none());

    let image = app.state.images.get(id).await.unwrap().unwrap();
    assert_eq!(image.owner_id, user);
    assert_eq!(image.title.as_deref(), Some("Sunset"));
    assert_eq!(image.tags, vec!["evening".to_string(), "sky".to_string()]);
    assert_eq!(app.queue.enqueued_total().await, 1);
    assert_eq!(app.stored_files("originals"), 1);
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post(&helpers::api_path("/images"))
        .multipart(MultipartForm::new().add_text("title", "x"))
        .await;
    assert_eq!(response.status_code(), 401);

    let response = app
        .client()
        .post(&helpers::api_path("/images"))
        .add_header("x-user-id", "not-a-uuid")
        .multipart(MultipartForm::new().add_text("title", "x"))
        .await;
    assert_eq!(response.status_code(), 401);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");

    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_missing_file_field_is_invalid_input() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post(&helpers::api_path("/images"))
        .add_header("x-user-id", Uuid::new_v4().to_string())
        .multipart(MultipartForm::new().add_text("title", "no file"))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_invalid_visibility_is_rejected() {
    let app = setup_test_app().await;

    let response = app
        .upload_form(Uuid::new_v4(), fixtures::create_test_png(8, 8), "a.png", |form| {
            form.add_text("visibility", "friends-only")
        })
        .await;

    assert_eq!(response.status_code(), 400);
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_size_ceiling_is_too_large_without_writes() {
    let app = setup_test_app_with(
        |config| config.validation.max_file_size_bytes = 256 * 1024,
        FailurePlan::none(),
        true,
    )
    .await;

    let mut data = fixtures::create_test_png(16, 16);
    data.resize(256 * 1024 + 1, 0);
    let response = app.upload(Uuid::new_v4(), data, "big.png").await;

    assert_eq!(response.status_code(), 413);
    let body: Value = response.json();
    assert_eq!(body["reason"], "too_large");
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(body["recoverable"], false);
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_unrecognized_content_is_unsupported_format() {
    let app = setup_test_app().await;

    let response = app
        .upload(Uuid::new_v4(), b"just some text, not pixels".to_vec(), "notes.png")
        .await;

    assert_eq!(response.status_code(), 415);
    let body: Value = response.json();
    assert_eq!(body["reason"], "unsupported_format");
    assert_eq!(body["code"], "UNSUPPORTED_MEDIA_TYPE");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_extension_mismatch_is_unsupported_format() {
    let app = setup_test_app().await;

    let response = app
        .upload(Uuid::new_v4(), fixtures::create_test_png(8, 8), "photo.jpg")
        .await;

    assert_eq!(response.status_code(), 415);
    let body: Value = response.json();
    assert_eq!(body["reason"], "unsupported_format");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_format_outside_allow_list_is_rejected_whatever_the_extension() {
    let app = setup_test_app_with(
        |config| {
            config.validation.allowed_formats = vec![ImageFormatKind::Jpeg, ImageFormatKind::Png]
        },
        FailurePlan::none(),
        true,
    )
    .await;

    for filename in ["anim.gif", "anim.png", "anim"] {
        let response = app
            .upload(Uuid::new_v4(), fixtures::create_test_gif(8, 8), filename)
            .await;
        assert_eq!(response.status_code(), 415, "filename {}", filename);
        let body: Value = response.json();
        assert_eq!(body["reason"], "unsupported_format");
    }
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_eicar_upload_is_malware_without_side_effects() {
    let app = setup_test_app().await;

    let response = app
        .upload(Uuid::new_v4(), fixtures::create_infected_png(), "clip.png")
        .await;

    assert_eq!(response.status_code(), 422);
    let body: Value = response.json();
    assert_eq!(body["reason"], "malware_detected");
    assert_eq!(body["code"], "MALWARE_DETECTED");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_fifty_megapixel_image_is_pixel_count_exceeded() {
    let app = setup_test_app().await;

    let response = app
        .upload(Uuid::new_v4(), fixtures::create_png_header(10_000, 5_000), "huge.png")
        .await;

    assert_eq!(response.status_code(), 422);
    let body: Value = response.json();
    assert_eq!(body["reason"], "pixel_count_exceeded");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_oversized_dimension_is_dimensions_exceeded() {
    let app = setup_test_app().await;

    let response = app
        .upload(Uuid::new_v4(), fixtures::create_png_header(12_000, 10), "strip.png")
        .await;

    assert_eq!(response.status_code(), 422);
    let body: Value = response.json();
    assert_eq!(body["reason"], "dimensions_exceeded");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_truncated_image_is_decode_failed() {
    let app = setup_test_app().await;

    let data = fixtures::create_test_png(128, 128);
    let truncated = data[..data.len() / 2].to_vec();
    let response = app.upload(Uuid::new_v4(), truncated, "cut.png").await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["reason"], "decode_failed");
    assert_no_side_effects(&app).await;
}

#[tokio::test]
async fn test_storage_outage_on_original_is_retryable() {
    let app = setup_test_app_with(|_| {}, FailurePlan::original_puts(1), true).await;

    let response = app
        .upload(Uuid::new_v4(), fixtures::create_test_png(8, 8), "a.png")
        .await;

    assert_eq!(response.status_code(), 503);
    let body: Value = response.json();
    assert_eq!(body["code"], "STORAGE_ERROR");
    assert_eq!(body["recoverable"], true);
    assert!(body.get("reason").is_none());
    assert_no_side_effects(&app).await;
}

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;

use crate::test_support::{self, ScriptedGrader, ScriptedImages};

const SUBMISSIONS: &str = "/api/v1/submissions";

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("response")
}

async fn get(app: &Router, uri: &str) -> Response {
    send(app, test_support::json_request(Method::GET, uri, None)).await
}

async fn post(app: &Router, uri: &str) -> Response {
    send(app, test_support::json_request(Method::POST, uri, None)).await
}

async fn delete(app: &Router, uri: &str) -> Response {
    send(app, test_support::json_request(Method::DELETE, uri, None)).await
}

async fn create(app: &Router) -> String {
    let response = send(app, test_support::png_upload(SUBMISSIONS, None)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = test_support::read_json(response).await;
    json["id"].as_str().expect("id").to_string()
}

fn upload(filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    test_support::multipart_request(Method::POST, SUBMISSIONS, filename, content_type, bytes, None)
}

#[tokio::test]
async fn create_returns_idle_record_with_preview() {
    let ctx = test_support::default_test_context().await;

    let response = send(&ctx.app, test_support::png_upload(SUBMISSIONS, Some("  Ada "))).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = test_support::read_json(response).await;
    let id = json["id"].as_str().expect("id");
    assert_eq!(json["display_name"], "Ada");
    assert_eq!(json["status"], "idle");
    assert_eq!(json["attempts"], 0);
    assert_eq!(json["image"]["mime_type"], "image/png");
    assert_eq!(json["image"]["size"], test_support::PNG_BYTES.len());
    assert_eq!(json["preview_url"], format!("/api/v1/submissions/{id}/image"));
    assert!(json["error_message"].is_null());
    assert_eq!(ctx.grader.calls(), 0);
}

#[tokio::test]
async fn jpg_alias_is_normalized() {
    let ctx = test_support::default_test_context().await;

    let response = send(&ctx.app, upload("scan.JPG", "image/jpg", b"\xFF\xD8\xFF\xE0")).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = test_support::read_json(response).await;
    assert_eq!(json["image"]["mime_type"], "image/jpeg");
    assert_eq!(json["image"]["filename"], "scan.JPG");
}

#[tokio::test]
async fn create_rejects_unsupported_uploads() {
    let ctx = test_support::default_test_context().await;

    let cases = [
        upload("notes.pdf", "application/pdf", b"%PDF-1.4"),
        upload("work.png", "image/jpeg", test_support::PNG_BYTES),
        upload("work", "image/png", test_support::PNG_BYTES),
        upload("work.png", "image/png", b""),
    ];
    for request in cases {
        let response = send(&ctx.app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = test_support::read_json(response).await;
        assert_eq!(json["status"], 400);
    }

    assert!(ctx.state.grader().list_submissions().await.is_empty());
}

#[tokio::test]
async fn create_without_file_part_is_bad_request() {
    let ctx = test_support::default_test_context().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri(SUBMISSIONS)
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=empty")
        .body(Body::from(
            "--empty\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nAda\r\n--empty--\r\n",
        ))
        .unwrap();

    let response = send(&ctx.app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test_support::read_json(response).await["detail"], "File is required");
}

#[tokio::test]
async fn create_rejects_oversized_files() {
    let ctx = test_support::default_test_context().await;
    let limit = ctx.state.settings().storage().max_upload_bytes();
    let bytes = vec![0u8; limit + 1];

    let response = send(&ctx.app, upload("big.png", "image/png", &bytes)).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(ctx.state.grader().list_submissions().await.is_empty());
}

#[tokio::test]
async fn get_unknown_submission_is_not_found() {
    let ctx = test_support::default_test_context().await;
    let uri = format!("{SUBMISSIONS}/{}", Uuid::new_v4());

    let response = get(&ctx.app, &uri).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(test_support::read_json(response).await["detail"], "Submission not found");
}

#[tokio::test]
async fn image_is_served_with_etag() {
    let ctx = test_support::default_test_context().await;
    let id = create(&ctx.app).await;
    let uri = format!("{SUBMISSIONS}/{id}/image");

    let response = get(&ctx.app, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let etag = response.headers()[header::ETAG].to_str().expect("etag").to_string();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(&body[..], test_support::PNG_BYTES);

    let cached = Request::builder()
        .uri(&uri)
        .header(header::IF_NONE_MATCH, etag)
        .body(Body::empty())
        .unwrap();
    let response = send(&ctx.app, cached).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn delete_removes_record() {
    let ctx = test_support::default_test_context().await;
    let id = create(&ctx.app).await;
    let uri = format!("{SUBMISSIONS}/{id}");

    let response = delete(&ctx.app, &uri).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(&ctx.app, &uri).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = delete(&ctx.app, &uri).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn regrade_runs_in_background() {
    let ctx = test_support::default_test_context().await;
    let id = create(&ctx.app).await;
    let uri = format!("{SUBMISSIONS}/{id}/regrade");

    let response = post(&ctx.app, &uri).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = test_support::read_json(response).await;
    assert_eq!(json["status"], "processing");
    assert_eq!(json["attempts"], 1);

    ctx.state.grader().wait_until_idle().await;

    let uri = format!("{SUBMISSIONS}/{id}");
    let response = get(&ctx.app, &uri).await;
    let json = test_support::read_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["result"]["score"], 7.0);
}

#[tokio::test]
async fn regrade_can_wait_for_result() {
    let ctx = test_support::default_test_context().await;
    let id = create(&ctx.app).await;
    let uri = format!("{SUBMISSIONS}/{id}/regrade?wait=true");

    let response = post(&ctx.app, &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = test_support::read_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["result"]["score"], 7.0);
    assert_eq!(json["attempts"], 1);
    assert!(!ctx.state.grader().is_running());
}

#[tokio::test]
async fn regrade_conflicts_with_running_batch() {
    let ctx = test_support::setup_test_context(
        ScriptedGrader::succeeding(6.0).held(),
        ScriptedImages::empty(),
    )
    .await;
    let id = create(&ctx.app).await;

    let response = post(&ctx.app, "/api/v1/batch").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let uri = format!("{SUBMISSIONS}/{id}/regrade");
    let response = post(&ctx.app, &uri).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    ctx.grader.release(1);
    ctx.state.grader().wait_until_idle().await;
    assert_eq!(ctx.grader.calls(), 1);
}

#[tokio::test]
async fn regrade_unknown_submission_is_not_found() {
    let ctx = test_support::default_test_context().await;
    let uri = format!("{SUBMISSIONS}/{}/regrade", Uuid::new_v4());

    let response = post(&ctx.app, &uri).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!ctx.state.grader().is_running());
}

#[tokio::test]
async fn full_working_set_rejects_uploads() {
    let ctx = test_support::default_test_context().await;
    let limit = ctx.state.settings().storage().max_submissions;
    for _ in 0..limit {
        create(&ctx.app).await;
    }

    let response = send(&ctx.app, test_support::png_upload(SUBMISSIONS, None)).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.state.grader().list_submissions().await.len(), limit);
}

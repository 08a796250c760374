//! Operator provisioning behind the admin API key, plus health and metrics.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{TestApp, TEST_ADMIN_API_KEY};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn admin_post(app: &TestApp, uri: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-admin-api-key", key);
    }
    let response = app
        .router
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn onboarding_requires_the_admin_key() {
    let app = TestApp::spawn();
    let body = json!({ "email": "new@acme.test", "password": "long enough password" });

    let (status, _) = admin_post(&app, "/admin/onboarding/users", None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = admin_post(&app, "/admin/onboarding/users", Some("wrong"), body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn new_organization_owner_can_log_in() {
    let app = TestApp::spawn();

    let (status, user) = admin_post(
        &app,
        "/admin/onboarding/users",
        Some(TEST_ADMIN_API_KEY),
        json!({
            "email": "Founder@Gamma.test",
            "password": "a sufficiently long password",
            "display_name": "Founder"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], "founder@gamma.test");
    assert!(user.get("password_hash").is_none());

    let (status, created) = admin_post(
        &app,
        "/admin/onboarding/organizations",
        Some(TEST_ADMIN_API_KEY),
        json!({ "name": "Gamma Living", "owner_email": "founder@gamma.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["owner"]["is_owner"], true);
    assert_eq!(created["owner"]["role"], "Admin");

    let (status, session) = app
        .login("founder@gamma.test", "a sufficiently long password")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["organization_id"], created["organization"]["id"]);
    assert_eq!(session["is_owner"], true);
}

#[tokio::test]
async fn duplicate_email_and_short_password_are_rejected() {
    let app = TestApp::spawn();

    let (status, _) = admin_post(
        &app,
        "/admin/onboarding/users",
        Some(TEST_ADMIN_API_KEY),
        json!({ "email": common::OWNER_A, "password": "a sufficiently long password" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = admin_post(
        &app,
        "/admin/onboarding/users",
        Some(TEST_ADMIN_API_KEY),
        json!({ "email": "short@acme.test", "password": "short" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn organization_owner_must_exist() {
    let app = TestApp::spawn();

    let (status, _) = admin_post(
        &app,
        "/admin/onboarding/organizations",
        Some(TEST_ADMIN_API_KEY),
        json!({ "name": "Ghost Homes", "owner_email": "ghost@nowhere.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_check_reports_store_status() {
    let app = TestApp::spawn();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "care-service-test");
    assert_eq!(body["checks"]["database"], "up");
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let app = TestApp::spawn();

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-content-type-options"));
    assert!(response.headers().contains_key("x-request-id"));
}

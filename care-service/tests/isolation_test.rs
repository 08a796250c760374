//! Row-level isolation and home scoping through the HTTP surface.

mod common;

use axum::http::{Method, StatusCode};
use care_service::models::{AuditOutcome, RecordKind};
use common::{TestApp, CAREGIVER_X, OWNER_A};
use serde_json::json;

#[tokio::test]
async fn cross_tenant_read_is_hidden_and_audited_once() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;
    let mark = app.audit().len();

    let (status, body) = app
        .get(&format!("/records/client/{}", app.fx.client_b1), &token)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("first_name").is_none());

    let entries = app.audit_since(mark);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);
    assert_eq!(entries[0].action, "record.read");
    assert_eq!(entries[0].organization_id, Some(app.fx.acme));
    assert_eq!(entries[0].resource_id, Some(app.fx.client_b1.to_string()));
}

#[tokio::test]
async fn cross_tenant_and_missing_ids_look_the_same() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;

    let (foreign_status, foreign_body) = app
        .get(&format!("/records/client/{}", app.fx.client_b1), &token)
        .await;
    let (missing_status, missing_body) = app
        .get(&format!("/records/client/{}", uuid::Uuid::new_v4()), &token)
        .await;

    assert_eq!(foreign_status, missing_status);
    assert_eq!(foreign_body, missing_body);

    let entries = app.audit();
    let last_two: Vec<_> = entries.iter().rev().take(2).collect();
    assert_eq!(last_two[0].outcome, AuditOutcome::Failure);
    assert_eq!(last_two[1].outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn cross_tenant_update_leaves_the_record_untouched() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;
    let mark = app.audit().len();

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/records/client/{}", app.fx.client_b1),
            Some(&token),
            Some(json!({ "data": { "first_name": "Mallory" } })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let entries = app.audit_since(mark);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "record.update");
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);

    let owner_b = app.session(common::OWNER_B, None).await;
    let (status, body) = app
        .get(&format!("/records/client/{}", app.fx.client_b1), &owner_b)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Edsger");
}

#[tokio::test]
async fn insert_naming_another_organization_is_rejected() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;
    let mark = app.audit().len();

    let (status, _) = app
        .post(
            "/records/client",
            Some(&token),
            json!({
                "organization_id": app.fx.beta,
                "home_id": app.fx.home_b1,
                "data": { "first_name": "Trudy" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let entries = app.audit_since(mark);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);
    assert_eq!(entries[0].organization_id, Some(app.fx.acme));
}

#[tokio::test]
async fn list_returns_only_the_callers_organization() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;

    let (status, body) = app.get("/records/client", &token).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|r| r["organization_id"] == json!(app.fx.acme)));
}

#[tokio::test]
async fn caregiver_out_of_scope_read_is_a_denied_not_found() {
    let app = TestApp::spawn();
    let token = app.session(CAREGIVER_X, None).await;
    let mark = app.audit().len();

    let (status, _) = app
        .get(&format!("/records/client/{}", app.fx.client_c2), &token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let entries = app.audit_since(mark);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);
    assert_eq!(entries[0].user_id, Some(app.fx.caregiver_x));
    assert_eq!(entries[0].resource_id, Some(app.fx.client_c2.to_string()));
}

#[tokio::test]
async fn caregiver_list_is_narrowed_to_assigned_homes() {
    let app = TestApp::spawn();
    let token = app.session(CAREGIVER_X, None).await;

    let (status, body) = app.get("/records/client", &token).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(app.fx.client_c1));

    // Explicit out-of-scope home filter yields nothing rather than an error
    let mark = app.audit().len();
    let (status, body) = app
        .get(&format!("/records/client?home_id={}", app.fx.home_h2), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let entries = app.audit_since(mark);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "record.list");
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn caregiver_without_homes_sees_empty_lists() {
    let app = TestApp::spawn();
    let owner = app.session(OWNER_A, None).await;
    let caregiver = app.session(CAREGIVER_X, None).await;

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/homes/{}/caregivers/{}", app.fx.home_h1, app.fx.caregiver_x),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get("/records/client", &caregiver).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, scope) = app.get("/homes/scope", &caregiver).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scope["home_ids"], json!([]));
}

#[tokio::test]
async fn caregiver_cannot_create_in_an_unassigned_home() {
    let app = TestApp::spawn();
    let token = app.session(CAREGIVER_X, None).await;

    let (status, _) = app
        .post(
            "/records/care_log",
            Some(&token),
            json!({ "home_id": app.fx.home_h2, "data": { "note": "checked in" } }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post(
            "/records/care_log",
            Some(&token),
            json!({ "home_id": app.fx.home_h1, "data": { "note": "checked in" } }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["organization_id"], json!(app.fx.acme));
    assert_eq!(body["created_by"], json!(app.fx.caregiver_x));
}

#[tokio::test]
async fn caregiver_cannot_deactivate_records() {
    let app = TestApp::spawn();
    let token = app.session(CAREGIVER_X, None).await;

    let (status, _) = app
        .post(
            &format!("/records/client/{}/deactivate", app.fx.client_c1),
            Some(&token),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failed_audit_write_fails_the_mutation() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;
    let before = app.store.audit_entries().unwrap().len();

    app.store.fail_audit_writes(true);
    let (status, error) = app
        .post(
            "/records/client",
            Some(&token),
            json!({ "home_id": app.fx.home_h1, "data": { "first_name": "Lost" } }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["code"], "unavailable");
    app.store.fail_audit_writes(false);

    assert_eq!(app.store.audit_entries().unwrap().len(), before);
    let (_, body) = app.get("/records/client", &token).await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["data"]["first_name"] != "Lost"));
}

#[tokio::test]
async fn deactivated_records_drop_out_of_default_listing() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;

    let (status, body) = app
        .post(
            &format!("/records/client/{}/deactivate", app.fx.client_c2),
            Some(&token),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (_, body) = app.get("/records/client", &token).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = app
        .get("/records/client?include_inactive=true", &token)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn incidents_receive_a_check_digit_number() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;

    let (status, body) = app
        .post(
            "/records/incident",
            Some(&token),
            json!({
                "home_id": app.fx.home_h2,
                "data": { "incident_type": "Fall", "summary": "slipped in hallway" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let number = body["data"]["incident_number"].as_str().unwrap();
    assert!(care_service::services::incident_number::is_valid(number));
}

#[tokio::test]
async fn unknown_kind_is_not_found() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;

    let (status, _) = app.get("/records/invoice", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(RecordKind::ALL.iter().all(|k| k.as_str() != "invoice"));
}

#[tokio::test]
async fn requests_without_a_session_are_rejected() {
    let app = TestApp::spawn();

    let (status, _) = app
        .send(Method::GET, "/records/client", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/records/client", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

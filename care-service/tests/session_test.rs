//! Login, organization selection and session context.

mod common;

use axum::http::{Method, StatusCode};
use care_service::models::AuditOutcome;
use common::{TestApp, CAREGIVER_X, MULTI_Y, ORPHAN_Z, OWNER_A, SYSADMIN, TEST_PASSWORD};
use serde_json::json;

#[tokio::test]
async fn single_membership_logs_straight_into_the_organization() {
    let app = TestApp::spawn();

    let (status, body) = app.login(CAREGIVER_X, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "token_issued");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["organization_id"], json!(app.fx.acme));
    assert_eq!(body["org_role"], "Caregiver");
    assert_eq!(body["is_owner"], false);

    let login = app.audit().pop().unwrap();
    assert_eq!(login.action, "auth.login");
    assert_eq!(login.outcome, AuditOutcome::Success);
    assert_eq!(login.organization_id, Some(app.fx.acme));
}

#[tokio::test]
async fn multi_membership_requires_selection() {
    let app = TestApp::spawn();

    let (status, body) = app.login(MULTI_Y, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "organization_selection_required");
    assert!(body.get("access_token").is_none());
    assert_eq!(body["organizations"].as_array().unwrap().len(), 2);

    // Authenticated, but no organization chosen yet
    let selection = body["selection_token"].as_str().unwrap();
    let (status, _) = app.get("/auth/context", selection).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/auth/select-organization",
            None,
            json!({ "selection_token": selection, "organization_id": app.fx.beta }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organization_id"], json!(app.fx.beta));
    assert_eq!(body["org_role"], "Caregiver");
    assert_eq!(body["is_owner"], false);

    let token = body["access_token"].as_str().unwrap();
    let (status, ctx) = app.get("/auth/context", token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx["organization"]["organization_id"], json!(app.fx.beta));
    assert_eq!(ctx["organization"]["org_role"], "Caregiver");
}

#[tokio::test]
async fn selecting_a_foreign_organization_is_denied() {
    let app = TestApp::spawn();
    let (_, body) = app.login(CAREGIVER_X, TEST_PASSWORD).await;
    let token = body["access_token"].as_str().unwrap().to_string();

    let (_, body) = app.login(MULTI_Y, TEST_PASSWORD).await;
    let other_org = uuid::Uuid::new_v4();
    let mark = app.audit().len();
    let (status, _) = app
        .post(
            "/auth/select-organization",
            None,
            json!({ "selection_token": body["selection_token"], "organization_id": other_org }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let entries = app.audit_since(mark);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);

    // A session token cannot stand in for a selection handle
    let (status, _) = app
        .post(
            "/auth/select-organization",
            None,
            json!({ "selection_token": token, "organization_id": app.fx.acme }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn orphan_user_gets_no_session() {
    let app = TestApp::spawn();

    let (status, body) = app.login(ORPHAN_Z, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.get("access_token").is_none());

    let entry = app.audit().pop().unwrap();
    assert_eq!(entry.outcome, AuditOutcome::Failure);
    assert_eq!(entry.organization_id, None);
    assert_eq!(entry.user_id, Some(app.fx.orphan_z));
}

#[tokio::test]
async fn context_is_stable_for_the_same_token() {
    let app = TestApp::spawn();
    let token = app.session(OWNER_A, None).await;

    let (_, first) = app.get("/auth/context", &token).await;
    let (_, second) = app.get("/auth/context", &token).await;
    assert_eq!(first, second);
    assert_eq!(first["organization"]["is_owner"], true);
}

#[tokio::test]
async fn switching_issues_a_new_token_and_leaves_the_old_one_alone() {
    let app = TestApp::spawn();
    let acme_token = app.session(MULTI_Y, Some(app.fx.acme)).await;

    let (status, body) = app
        .post(
            "/auth/switch-organization",
            Some(&acme_token),
            json!({ "organization_id": app.fx.beta }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let beta_token = body["access_token"].as_str().unwrap();
    assert_ne!(beta_token, acme_token);

    let (_, old) = app.get("/auth/context", &acme_token).await;
    let (_, new) = app.get("/auth/context", beta_token).await;
    assert_eq!(old["organization"]["organization_id"], json!(app.fx.acme));
    assert_eq!(old["organization"]["org_role"], "Admin");
    assert_eq!(new["organization"]["organization_id"], json!(app.fx.beta));
    assert_eq!(new["organization"]["org_role"], "Caregiver");
}

#[tokio::test]
async fn wrong_password_is_generic_and_locks_after_threshold() {
    let app = TestApp::spawn();

    let (unknown_status, unknown_body) = app.login("nobody@acme.test", "whatever-password").await;
    let (wrong_status, wrong_body) = app.login(CAREGIVER_X, "not-the-password").await;
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, wrong_status);
    assert_eq!(unknown_body, wrong_body);

    for _ in 0..2 {
        app.login(CAREGIVER_X, "not-the-password").await;
    }

    let (status, _) = app.login(CAREGIVER_X, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app
        .audit()
        .iter()
        .any(|e| e.action == "auth.lockout" && e.user_id == Some(app.fx.caregiver_x)));
}

#[tokio::test]
async fn sysadmin_without_memberships_has_no_tenant_context() {
    let app = TestApp::spawn();

    let (status, body) = app.login(SYSADMIN, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("organization_id").is_none());

    let token = body["access_token"].as_str().unwrap();
    let (status, ctx) = app.get("/auth/context", token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ctx["organization"].is_null());
    assert_eq!(ctx["global_roles"], json!(["Sysadmin"]));

    let (status, _) = app.get("/records/client", token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn revoked_membership_invalidates_existing_session() {
    let app = TestApp::spawn();
    let owner = app.session(OWNER_A, None).await;
    let caregiver = app.session(CAREGIVER_X, None).await;

    let (status, _) = app.get("/records/client", &caregiver).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/organization/members/{}", app.fx.caregiver_x),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/records/client", &caregiver).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pending_selection_has_no_organization_context() {
    let app = TestApp::spawn();
    let (_, body) = app.login(MULTI_Y, TEST_PASSWORD).await;
    let selection = body["selection_token"].as_str().unwrap().to_string();

    let (status, error) = app.get("/records/client", &selection).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["error"], "No organization selected");

    let (status, _) = app
        .post(
            "/auth/switch-organization",
            Some(&selection),
            json!({ "organization_id": app.fx.acme }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/audit/events", &selection).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/admin/records/query", Some(&selection), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

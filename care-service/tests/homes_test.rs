//! Caregiver home assignments.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, CAREGIVER_X, OWNER_A};
use serde_json::json;

#[tokio::test]
async fn scope_reflects_assignments() {
    let app = TestApp::spawn();
    let caregiver = app.session(CAREGIVER_X, None).await;
    let owner = app.session(OWNER_A, None).await;

    let (status, body) = app.get("/homes/scope", &caregiver).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["all_homes"], false);
    assert_eq!(body["home_ids"], json!([app.fx.home_h1]));

    let (_, body) = app.get("/homes/scope", &owner).await;
    assert_eq!(body["all_homes"], true);
}

#[tokio::test]
async fn assignment_changes_apply_to_the_next_request() {
    let app = TestApp::spawn();
    let caregiver = app.session(CAREGIVER_X, None).await;
    let owner = app.session(OWNER_A, None).await;
    let c2 = format!("/records/client/{}", app.fx.client_c2);

    let (status, _) = app.get(&c2, &caregiver).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post(
            &format!("/homes/{}/caregivers", app.fx.home_h2),
            Some(&owner),
            json!({ "user_id": app.fx.caregiver_x }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["home_id"], json!(app.fx.home_h2));

    let (status, _) = app.get(&c2, &caregiver).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/homes/{}/caregivers/{}", app.fx.home_h2, app.fx.caregiver_x),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&c2, &caregiver).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn homes_of_other_organizations_cannot_be_assigned() {
    let app = TestApp::spawn();
    let owner = app.session(OWNER_A, None).await;

    let (status, _) = app
        .post(
            &format!("/homes/{}/caregivers", app.fx.home_b1),
            Some(&owner),
            json!({ "user_id": app.fx.caregiver_x }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn caregivers_cannot_assign_themselves() {
    let app = TestApp::spawn();
    let caregiver = app.session(CAREGIVER_X, None).await;

    let (status, _) = app
        .post(
            &format!("/homes/{}/caregivers", app.fx.home_h2),
            Some(&caregiver),
            json!({ "user_id": app.fx.caregiver_x }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

//! Shared fixture for care-service integration tests.
//!
//! Two organizations backed by the in-memory store:
//! - Acme: sole owner `owner@acme.test`, caregiver `x@acme.test` assigned to
//!   Home H1, and `y@both.test` as Admin. Clients C1 (H1) and C2 (H2).
//! - Beta: owner `owner@beta.test` and `y@both.test` as Caregiver.
//! Plus `z@nowhere.test` with no memberships and a Sysadmin with none.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use care_service::{
    build_router,
    config::{
        CareConfig, DatabaseConfig, Environment, JwtConfig, RateLimitConfig, SecurityConfig,
    },
    models::{
        AuditLogEntry, CaregiverHomeAssignment, GlobalRole, OrgRole, Organization,
        OrganizationMembership, RecordKind, TenantRecord, User,
    },
    services::{JwtService, MemoryStore},
    utils::{hash_password, Password},
    AppState,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const OWNER_A: &str = "owner@acme.test";
pub const OWNER_B: &str = "owner@beta.test";
pub const CAREGIVER_X: &str = "x@acme.test";
pub const MULTI_Y: &str = "y@both.test";
pub const ORPHAN_Z: &str = "z@nowhere.test";
pub const SYSADMIN: &str = "root@care.test";

fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| {
        hash_password(&Password::new(TEST_PASSWORD)).expect("Failed to hash test password")
    })
    .clone()
}

pub fn test_config() -> CareConfig {
    CareConfig {
        common: service_core::config::Config {
            port: 8080,
            log_level: "error".to_string(),
            otlp_endpoint: None,
        },
        environment: Environment::Dev,
        service_name: "care-service-test".to_string(),
        service_version: "0.0.0-test".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            private_key_path: None,
            public_key_path: None,
            hmac_secret: Some("test-hmac-secret-at-least-32-bytes!!".to_string()),
            issuer: "care-service-test".to_string(),
            session_expiry_minutes: 30,
            selection_expiry_minutes: 5,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_api_key: TEST_ADMIN_API_KEY.to_string(),
            lockout_threshold: 3,
            lockout_minutes: 15,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

pub struct Fixture {
    pub acme: Uuid,
    pub beta: Uuid,
    pub owner_a: Uuid,
    pub owner_b: Uuid,
    pub caregiver_x: Uuid,
    pub multi_y: Uuid,
    pub orphan_z: Uuid,
    pub sysadmin: Uuid,
    pub home_h1: Uuid,
    pub home_h2: Uuid,
    pub home_b1: Uuid,
    pub client_c1: Uuid,
    pub client_c2: Uuid,
    pub client_b1: Uuid,
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub fx: Fixture,
}

fn user(store: &MemoryStore, email: &str) -> Uuid {
    let user = User::new(email, None, password_hash());
    let id = user.id;
    store.insert_user(user).expect("Failed to seed user");
    id
}

fn member(store: &MemoryStore, user_id: Uuid, org: Uuid, role: OrgRole, is_owner: bool) {
    store
        .insert_membership(OrganizationMembership::new(user_id, org, role, is_owner))
        .expect("Failed to seed membership");
}

fn record(
    store: &MemoryStore,
    kind: RecordKind,
    org: Uuid,
    home: Option<Uuid>,
    created_by: Uuid,
    data: Value,
) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    store
        .insert_record(TenantRecord {
            id,
            kind,
            organization_id: org,
            home_id: if kind == RecordKind::Home { Some(id) } else { home },
            is_active: true,
            data,
            created_by,
            created_at: now,
            updated_at: now,
        })
        .expect("Failed to seed record");
    id
}

impl TestApp {
    pub fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());

        let acme = Organization::new("Acme Care");
        let beta = Organization::new("Beta Homes");
        let (acme_id, beta_id) = (acme.id, beta.id);
        store.insert_organization(acme).expect("Failed to seed org");
        store.insert_organization(beta).expect("Failed to seed org");

        let owner_a = user(&store, OWNER_A);
        let owner_b = user(&store, OWNER_B);
        let caregiver_x = user(&store, CAREGIVER_X);
        let multi_y = user(&store, MULTI_Y);
        let orphan_z = user(&store, ORPHAN_Z);

        let root = User::new(SYSADMIN, None, password_hash()).with_global_role(GlobalRole::Sysadmin);
        let sysadmin = root.id;
        store.insert_user(root).expect("Failed to seed sysadmin");

        member(&store, owner_a, acme_id, OrgRole::Admin, true);
        member(&store, caregiver_x, acme_id, OrgRole::Caregiver, false);
        member(&store, multi_y, acme_id, OrgRole::Admin, false);
        member(&store, owner_b, beta_id, OrgRole::Admin, true);
        member(&store, multi_y, beta_id, OrgRole::Caregiver, false);

        let home = |org, owner, name: &str, seq: i64| {
            record(
                &store,
                RecordKind::Home,
                org,
                None,
                owner,
                json!({ "name": name, "home_sequence": seq }),
            )
        };
        let home_h1 = home(acme_id, owner_a, "H1", 1);
        let home_h2 = home(acme_id, owner_a, "H2", 2);
        let home_b1 = home(beta_id, owner_b, "B1", 1);

        let client_c1 = record(
            &store,
            RecordKind::Client,
            acme_id,
            Some(home_h1),
            owner_a,
            json!({"first_name": "Ada"}),
        );
        let client_c2 = record(
            &store,
            RecordKind::Client,
            acme_id,
            Some(home_h2),
            owner_a,
            json!({"first_name": "Grace"}),
        );
        let client_b1 = record(
            &store,
            RecordKind::Client,
            beta_id,
            Some(home_b1),
            owner_b,
            json!({"first_name": "Edsger"}),
        );

        store
            .insert_assignment(CaregiverHomeAssignment::new(
                caregiver_x,
                home_h1,
                acme_id,
                owner_a,
            ))
            .expect("Failed to seed assignment");

        let config = test_config();
        let jwt = JwtService::from_secret(
            b"test-hmac-secret-at-least-32-bytes!!",
            &config.jwt.issuer,
            config.jwt.session_expiry_minutes,
            config.jwt.selection_expiry_minutes,
        );
        let state = AppState::new(config, store.clone(), jwt);

        Self {
            router: build_router(state),
            store,
            fx: Fixture {
                acme: acme_id,
                beta: beta_id,
                owner_a,
                owner_b,
                caregiver_x,
                multi_y,
                orphan_z,
                sysadmin,
                home_h1,
                home_h2,
                home_b1,
                client_c1,
                client_c2,
                client_b1,
            },
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/auth/login",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Session token for `email` in `org`, selecting the organization when
    /// login asks for it.
    pub async fn session(&self, email: &str, org: Option<Uuid>) -> String {
        let (status, body) = self.login(email, TEST_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");

        if body["status"] == "organization_selection_required" {
            let org = org.expect("organization required for multi-membership user");
            let (status, body) = self
                .post(
                    "/auth/select-organization",
                    None,
                    json!({
                        "selection_token": body["selection_token"],
                        "organization_id": org,
                    }),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "selection failed: {body}");
            return body["access_token"].as_str().unwrap().to_string();
        }

        body["access_token"].as_str().unwrap().to_string()
    }

    pub fn audit(&self) -> Vec<AuditLogEntry> {
        self.store.audit_entries().unwrap()
    }

    /// Entries appended since `mark` entries had been written.
    pub fn audit_since(&self, mark: usize) -> Vec<AuditLogEntry> {
        self.audit().into_iter().skip(mark).collect()
    }
}

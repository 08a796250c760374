pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::CareConfig;
use crate::middleware::admin::ADMIN_API_KEY_HEADER;
use crate::services::{
    AuditWriter, CareStore, HomeScopeService, JwtService, MembershipService, OnboardingService,
    SessionService, TenantRecords,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CareConfig>,
    pub store: Arc<dyn CareStore>,
    pub jwt: Arc<JwtService>,
    pub audit: AuditWriter,
    pub records: TenantRecords,
    pub home_scope: HomeScopeService,
    pub sessions: SessionService,
    pub memberships: MembershipService,
    pub onboarding: OnboardingService,
    pub login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every service onto one store. Rate limiters come from config.
    pub fn new(config: CareConfig, store: Arc<dyn CareStore>, jwt: JwtService) -> Self {
        let jwt = Arc::new(jwt);
        let audit = AuditWriter::new(store.clone());
        let home_scope = HomeScopeService::new(store.clone(), audit.clone());
        let records = TenantRecords::new(store.clone(), audit.clone(), home_scope.clone());
        let sessions = SessionService::new(
            store.clone(),
            audit.clone(),
            jwt.clone(),
            config.security.lockout_threshold,
            config.security.lockout_minutes,
        );
        let memberships = MembershipService::new(store.clone(), audit.clone());
        let onboarding = OnboardingService::new(store.clone(), audit.clone());

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            config: Arc::new(config),
            store,
            jwt,
            audit,
            records,
            home_scope,
            sessions,
            memberships,
            onboarding,
            login_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Operator provisioning, admin API key only
    let admin_routes = Router::new()
        .route(
            "/admin/onboarding/users",
            post(handlers::onboarding::create_user),
        )
        .route(
            "/admin/onboarding/organizations",
            post(handlers::onboarding::create_organization),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    // Credential-bearing routes share the login limiter
    let login_routes = Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/select-organization", post(handlers::select_organization))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let session_routes = Router::new()
        .route("/auth/switch-organization", post(handlers::switch_organization))
        .route("/auth/context", get(handlers::context))
        .route(
            "/records/:kind",
            get(handlers::records::list_records).post(handlers::records::create_record),
        )
        .route(
            "/records/:kind/:id",
            get(handlers::records::get_record).put(handlers::records::update_record),
        )
        .route(
            "/records/:kind/:id/deactivate",
            post(handlers::records::deactivate_record),
        )
        .route("/homes/scope", get(handlers::homes::home_scope))
        .route(
            "/homes/:home_id/caregivers",
            post(handlers::homes::assign_caregiver),
        )
        .route(
            "/homes/:home_id/caregivers/:user_id",
            delete(handlers::homes::unassign_caregiver),
        )
        .route(
            "/organization/members",
            get(handlers::members::list_members).post(handlers::members::add_member),
        )
        .route(
            "/organization/members/:user_id",
            patch(handlers::members::update_member)
                .delete(handlers::members::deactivate_member),
        )
        .route(
            "/organization/ownership-transfer",
            post(handlers::members::transfer_ownership),
        )
        .route("/audit/events", get(handlers::audit::list_audit_events))
        .route(
            "/admin/records/query",
            post(handlers::bypass::query_all_tenants),
        )
        .route(
            "/admin/records/:kind/:id",
            get(handlers::bypass::get_any_tenant),
        )
        .route(
            "/admin/records/:kind/:id/location",
            get(handlers::bypass::locate_record),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ));

    let allowed_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let ip_limiter = state.ip_rate_limiter.clone();

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .merge(login_routes)
        .merge(admin_routes)
        .merge(session_routes)
        .with_state(state)
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static(ADMIN_API_KEY_HEADER),
                ]),
        )
}

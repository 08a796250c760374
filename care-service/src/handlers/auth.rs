use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::auth::{
        ContextResponse, LoginRequest, SelectOrganizationRequest, SwitchOrganizationRequest,
    },
    middleware::ClientIp,
    services::Principal,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with email and password.
///
/// Returns either a session token or, for users with several memberships,
/// a short-lived selection token plus the organizations to choose from.
pub async fn login(
    State(state): State<AppState>,
    ip: ClientIp,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password = Password::new(req.password);
    let res = state
        .sessions
        .login(&req.email, &password, ip.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn select_organization(
    State(state): State<AppState>,
    ip: ClientIp,
    ValidatedJson(req): ValidatedJson<SelectOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .sessions
        .select_organization(&req.selection_token, req.organization_id, ip.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn switch_organization(
    State(state): State<AppState>,
    ip: ClientIp,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<SwitchOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .sessions
        .switch_organization(&principal, req.organization_id, ip.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn context(principal: Principal) -> Result<impl IntoResponse, AppError> {
    Ok(Json(ContextResponse {
        user_id: principal.user_id,
        email: principal.email,
        global_roles: principal.global_roles,
        organization: principal.tenant,
    }))
}

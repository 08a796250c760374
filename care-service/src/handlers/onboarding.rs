use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::onboarding::{CreateOrganizationRequest, CreateOrganizationResponse, CreateUserRequest},
    middleware::ClientIp,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Provision a user account. Admin API key only.
pub async fn create_user(
    State(state): State<AppState>,
    ip: ClientIp,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password = Password::new(req.password);
    let user = state
        .onboarding
        .create_user(
            &req.email,
            req.display_name,
            &password,
            req.sysadmin,
            ip.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Create an organization with an existing user as its first owner.
pub async fn create_organization(
    State(state): State<AppState>,
    ip: ClientIp,
    ValidatedJson(req): ValidatedJson<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (organization, owner) = state
        .onboarding
        .create_organization(&req.name, &req.owner_email, ip.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateOrganizationResponse {
            organization,
            owner,
        }),
    ))
}

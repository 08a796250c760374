use serde_json::json;
use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::members::AssignCaregiverRequest,
    middleware::ClientIp,
    services::{HomeScope, ServiceError, TenantContext},
    utils::ValidatedJson,
    AppState,
};

/// The homes the caller may see in the current organization.
pub async fn home_scope(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let body = match state.home_scope.scope_for(&ctx).await? {
        HomeScope::All => json!({ "all_homes": true, "home_ids": [] }),
        HomeScope::Homes(homes) => {
            let mut ids: Vec<Uuid> = homes.into_iter().collect();
            ids.sort();
            json!({ "all_homes": false, "home_ids": ids })
        }
    };
    Ok(Json(body))
}

pub async fn assign_caregiver(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path(home_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AssignCaregiverRequest>,
) -> Result<impl IntoResponse, AppError> {
    let assignment = state
        .home_scope
        .assign(&ctx, home_id, req.user_id, ip.as_deref())
        .await
        .map_err(ServiceError::hide_existence)?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn unassign_caregiver(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path((home_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .home_scope
        .unassign(&ctx, home_id, user_id, ip.as_deref())
        .await
        .map_err(ServiceError::hide_existence)?;
    Ok(StatusCode::NO_CONTENT)
}

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
    dtos::members::{AddMemberRequest, TransferOwnershipRequest, UpdateMemberRequest},
    middleware::ClientIp,
    services::TenantContext,
    utils::ValidatedJson,
    AppState,
};

pub async fn list_members(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let members = state.memberships.list_members(&ctx).await?;
    Ok(Json(members))
}

pub async fn add_member(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    ValidatedJson(req): ValidatedJson<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let membership = state
        .memberships
        .add_member(&ctx, &req.email, req.role, req.is_owner, ip.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

/// Change a member's role or owner flag. One field per request, so each
/// change gets its own audit entry and last-owner check.
pub async fn update_member(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path(user_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let members = match (req.role, req.is_owner) {
        (Some(role), None) => {
            state
                .memberships
                .change_role(&ctx, user_id, role, ip.as_deref())
                .await?
        }
        (None, Some(is_owner)) => {
            state
                .memberships
                .set_owner(&ctx, user_id, is_owner, ip.as_deref())
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Exactly one of role or is_owner must be provided"
            )))
        }
    };
    Ok(Json(members))
}

pub async fn deactivate_member(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let members = state
        .memberships
        .deactivate_member(&ctx, user_id, ip.as_deref())
        .await?;
    Ok(Json(members))
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    ValidatedJson(req): ValidatedJson<TransferOwnershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    let members = state
        .memberships
        .transfer_ownership(&ctx, req.to_user_id, ip.as_deref())
        .await?;
    Ok(Json(members))
}

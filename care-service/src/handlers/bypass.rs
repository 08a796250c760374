//! Sysadmin-only cross-tenant reads. Each call writes one privileged audit
//! entry before any data is returned.

use service_core::{
    axum::{
        extract::{Path, State},
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::records::BypassQueryRequest, handlers::records::parse_kind, middleware::ClientIp,
    services::Principal, utils::ValidatedJson, AppState,
};

pub async fn query_all_tenants(
    State(state): State<AppState>,
    ip: ClientIp,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<BypassQueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let records = state
        .records
        .query_all_tenants(&principal, req.organization_id, req.filter(), ip.as_deref())
        .await?;
    Ok(Json(records))
}

pub async fn get_any_tenant(
    State(state): State<AppState>,
    ip: ClientIp,
    principal: Principal,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let record = state
        .records
        .get_ignoring_filter(&principal, kind, id, ip.as_deref())
        .await?;
    Ok(Json(record))
}

pub async fn locate_record(
    State(state): State<AppState>,
    ip: ClientIp,
    principal: Principal,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let location = state
        .records
        .locate(&principal, kind, id, ip.as_deref())
        .await?;
    Ok(Json(location))
}

//! Tenant-scoped record routes, `/records/:kind[/:id]`.
//!
//! Id-addressed routes fold cross-tenant and home-scope violations into a
//! plain 404 so the response never confirms that a record exists elsewhere.

use service_core::{
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::records::{CreateRecordRequest, RecordQueryParams, UpdateRecordRequest},
    middleware::ClientIp,
    models::{NewRecord, RecordKind},
    services::{ServiceError, TenantContext},
    utils::ValidatedJson,
    AppState,
};

pub(crate) fn parse_kind(kind: &str) -> Result<RecordKind, AppError> {
    kind.parse()
        .map_err(|e: String| AppError::NotFound(anyhow::anyhow!(e)))
}

pub async fn list_records(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path(kind): Path<String>,
    Query(params): Query<RecordQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let records = state
        .records
        .query(&ctx, kind, params.into(), ip.as_deref())
        .await?;
    Ok(Json(records))
}

pub async fn create_record(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path(kind): Path<String>,
    ValidatedJson(req): ValidatedJson<CreateRecordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let new = NewRecord {
        kind,
        organization_id: req.organization_id.unwrap_or(ctx.organization_id),
        home_id: req.home_id,
        data: req.data,
    };
    let record = state.records.create(&ctx, new, ip.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_record(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let record = state
        .records
        .get(&ctx, kind, id, ip.as_deref())
        .await
        .map_err(ServiceError::hide_existence)?;
    Ok(Json(record))
}

pub async fn update_record(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path((kind, id)): Path<(String, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdateRecordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let record = state
        .records
        .update(&ctx, kind, id, req.into(), ip.as_deref())
        .await
        .map_err(ServiceError::hide_existence)?;
    Ok(Json(record))
}

pub async fn deactivate_record(
    State(state): State<AppState>,
    ip: ClientIp,
    ctx: TenantContext,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&kind)?;
    let record = state
        .records
        .deactivate(&ctx, kind, id, ip.as_deref())
        .await
        .map_err(ServiceError::hide_existence)?;
    Ok(Json(record))
}

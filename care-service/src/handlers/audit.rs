use service_core::{
    axum::{
        extract::{Query, State},
        response::IntoResponse,
        Json,
    },
    error::AppError,
};

use crate::{dtos::audit::AuditQueryParams, middleware::ClientIp, services::Principal, AppState};

/// Audit log query. Admins read their own organization; Sysadmins may name
/// any organization or the unscoped partition.
pub async fn list_audit_events(
    State(state): State<AppState>,
    ip: ClientIp,
    principal: Principal,
    Query(params): Query<AuditQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .audit
        .query(&principal, params.into(), ip.as_deref())
        .await?;
    Ok(Json(page))
}

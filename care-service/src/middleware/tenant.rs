//! Session middleware and caller-context extractors.
//!
//! The bearer token is resolved into a `Principal` once per request. Before
//! the handler runs, the embedded membership is re-read from the store so a
//! revoked membership or changed role fails closed instead of riding on a
//! still-valid token.
//!
//! A caller holding only an organization-selection handle is authenticated
//! but has no organization yet. Every route behind the middleware answers
//! that caller with `NoOrganizationContext`.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use uuid::Uuid;

use crate::services::{resolve_caller, Caller, Principal, ServiceError, TenantContext};
use crate::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Marks a request authenticated by a selection handle.
#[derive(Debug, Clone, Copy)]
pub struct SelectionPending {
    pub user_id: Uuid,
}

/// Require a valid session and attach `Principal` (and `TenantContext` when
/// an organization is selected) to the request.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(ServiceError::Unauthenticated)?;
    let principal = match resolve_caller(&state.jwt, token)? {
        Caller::Session(principal) => principal,
        Caller::SelectionPending { user_id } => {
            confirm_user_active(&state, user_id).await?;
            tracing::debug!(
                user_id = %user_id,
                "Selection handle presented before choosing an organization"
            );
            req.extensions_mut().insert(SelectionPending { user_id });
            return Ok(next.run(req).await);
        }
    };
    confirm_still_current(&state, &principal).await?;

    if let Some(ctx) = principal.tenant.clone() {
        req.extensions_mut().insert(ctx);
    }
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

async fn confirm_user_active(state: &AppState, user_id: Uuid) -> Result<(), ServiceError> {
    state
        .store
        .find_user(user_id)
        .await?
        .filter(|u| u.is_active)
        .map(|_| ())
        .ok_or(ServiceError::Unauthenticated)
}

/// The token's claims must still match the store: active user, same global
/// roles, active organization, active membership with the same role and
/// owner flag.
async fn confirm_still_current(state: &AppState, principal: &Principal) -> Result<(), ServiceError> {
    let user = state
        .store
        .find_user(principal.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(ServiceError::Unauthenticated)?;

    if user.is_sysadmin() != principal.is_sysadmin() {
        tracing::debug!(user_id = %user.id, "Global roles changed since token issue");
        return Err(ServiceError::Unauthenticated);
    }

    let Some(ctx) = &principal.tenant else {
        return Ok(());
    };

    let org_active = state
        .store
        .find_organization(ctx.organization_id)
        .await?
        .is_some_and(|o| o.is_active);
    let membership_current = state
        .store
        .find_membership(ctx.user_id, ctx.organization_id)
        .await?
        .is_some_and(|m| m.is_active && m.role == ctx.org_role && m.is_owner == ctx.is_owner);

    if !org_active || !membership_current {
        tracing::debug!(
            user_id = %ctx.user_id,
            organization_id = %ctx.organization_id,
            "Session membership no longer current"
        );
        return Err(ServiceError::Unauthenticated);
    }
    Ok(())
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }
        Err(missing_context(parts).into())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<TenantContext>() {
            return Ok(ctx.clone());
        }
        let err = if parts.extensions.get::<Principal>().is_some() {
            ServiceError::NoOrganizationContext
        } else {
            missing_context(parts)
        };
        Err(err.into())
    }
}

fn missing_context(parts: &Parts) -> ServiceError {
    if parts.extensions.get::<SelectionPending>().is_some() {
        ServiceError::NoOrganizationContext
    } else {
        ServiceError::Unauthenticated
    }
}

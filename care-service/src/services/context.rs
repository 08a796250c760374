//! Per-request caller context.
//!
//! Resolved once from the session token and passed explicitly to every
//! service call. Values are immutable; switching organizations issues a new
//! token rather than changing a context in place.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{GlobalRole, OrgRole};
use crate::services::error::ServiceError;
use crate::services::jwt::{JwtService, SessionClaims, TokenUse};

/// The caller's standing inside one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    pub user_id: Uuid,
    pub email: String,
    pub organization_id: Uuid,
    pub org_role: OrgRole,
    pub is_owner: bool,
    pub global_roles: Vec<GlobalRole>,
}

impl TenantContext {
    pub fn is_admin(&self) -> bool {
        self.org_role == OrgRole::Admin
    }
}

/// An authenticated caller, with or without a selected organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub global_roles: Vec<GlobalRole>,
    pub tenant: Option<TenantContext>,
}

impl Principal {
    pub fn is_sysadmin(&self) -> bool {
        self.global_roles.contains(&GlobalRole::Sysadmin)
    }

    pub fn tenant(&self) -> Result<&TenantContext, ServiceError> {
        self.tenant.as_ref().ok_or(ServiceError::NoOrganizationContext)
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.tenant.as_ref().map(|t| t.organization_id)
    }
}

/// What a bearer token proves about the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// A full session, with or without a selected organization.
    Session(Principal),
    /// Credentials checked, several memberships, none chosen yet.
    SelectionPending { user_id: Uuid },
}

/// Decode and validate a bearer token.
///
/// Fails closed with `Unauthenticated` on any defect: bad signature, expiry,
/// unparseable ids or roles, or an organization id without a role (and vice
/// versa). A valid selection handle resolves to `SelectionPending`, which
/// carries no tenant context.
pub fn resolve_caller(jwt: &JwtService, token: &str) -> Result<Caller, ServiceError> {
    let claims = jwt.decode(token).map_err(|e| {
        tracing::debug!(error = %e, "Session token rejected");
        ServiceError::Unauthenticated
    })?;

    match claims.token_use {
        TokenUse::Session => principal_from_claims(&claims).map(Caller::Session),
        TokenUse::Selection => {
            selection_user(&claims).map(|user_id| Caller::SelectionPending { user_id })
        }
    }
}

/// Validate a partial-authentication handle and return its user id.
pub fn resolve_selection_handle(jwt: &JwtService, token: &str) -> Result<Uuid, ServiceError> {
    let claims = jwt.decode(token).map_err(|_| ServiceError::Unauthenticated)?;
    if claims.token_use != TokenUse::Selection {
        return Err(ServiceError::Unauthenticated);
    }
    selection_user(&claims)
}

fn selection_user(claims: &SessionClaims) -> Result<Uuid, ServiceError> {
    if claims.org_id.is_some() || claims.org_role.is_some() {
        return Err(ServiceError::Unauthenticated);
    }
    Uuid::parse_str(&claims.sub).map_err(|_| ServiceError::Unauthenticated)
}

fn principal_from_claims(claims: &SessionClaims) -> Result<Principal, ServiceError> {
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ServiceError::Unauthenticated)?;

    let global_roles = claims
        .roles
        .iter()
        .map(|r| r.parse::<GlobalRole>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ServiceError::Unauthenticated)?;

    let tenant = match (&claims.org_id, &claims.org_role) {
        (Some(org_id), Some(org_role)) => Some(TenantContext {
            user_id,
            email: claims.email.clone(),
            organization_id: Uuid::parse_str(org_id)
                .map_err(|_| ServiceError::Unauthenticated)?,
            org_role: org_role
                .parse::<OrgRole>()
                .map_err(|_| ServiceError::Unauthenticated)?,
            is_owner: claims.is_owner,
            global_roles: global_roles.clone(),
        }),
        (None, None) if !claims.is_owner => None,
        _ => return Err(ServiceError::Unauthenticated),
    };

    Ok(Principal {
        user_id,
        email: claims.email.clone(),
        global_roles,
        tenant,
    })
}

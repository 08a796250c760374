use service_core::error::AppError;
use thiserror::Error;

use crate::services::store::StoreError;

/// Generic message for tenant and home-scope violations. Full detail goes to
/// the audit log only.
pub const NOT_FOUND_MESSAGE: &str = "Resource not found";
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("No organization selected")]
    NoOrganizationContext,

    #[error("User has no organization memberships")]
    OrphanUser,

    #[error("Cross-tenant access violation")]
    CrossTenantViolation,

    #[error("Not a member of the requested organization")]
    NotAMember,

    #[error("Resource outside assigned homes")]
    InsufficientHomeScope,

    #[error("Audit write failed: {0}")]
    AuditWriteFailure(String),

    #[error("Cannot remove or demote the last owner of an organization")]
    LastOwnerRemovalRejected,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AuditWrite(msg) => ServiceError::AuditWriteFailure(msg),
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Rejected(rejection) => rejection.into(),
            other => ServiceError::Store(other),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired session"))
            }
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::NoOrganizationContext => {
                AppError::Forbidden(anyhow::anyhow!("No organization selected"))
            }
            ServiceError::OrphanUser => AppError::Forbidden(anyhow::anyhow!(
                "Your account is not a member of any organization. Contact your administrator."
            )),
            ServiceError::NotAMember => {
                AppError::Forbidden(anyhow::anyhow!("Not a member of the requested organization"))
            }
            ServiceError::AccountLocked => AppError::Forbidden(anyhow::anyhow!(
                "Account temporarily locked. Try again later."
            )),
            ServiceError::Forbidden | ServiceError::CrossTenantViolation => {
                AppError::Forbidden(anyhow::anyhow!(ACCESS_DENIED_MESSAGE))
            }
            ServiceError::NotFound | ServiceError::InsufficientHomeScope => {
                AppError::NotFound(anyhow::anyhow!(NOT_FOUND_MESSAGE))
            }
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::LastOwnerRemovalRejected => AppError::Conflict(anyhow::anyhow!(
                "Cannot remove or demote the last owner of an organization"
            )),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::AuditWriteFailure(msg) => {
                tracing::error!(error = %msg, "Audit write failed; operation aborted");
                AppError::ServiceUnavailable(
                    "Audit log unavailable; no changes were made".to_string(),
                )
            }
            ServiceError::Store(StoreError::Unavailable(msg)) => {
                tracing::error!(error = %msg, "Store unavailable");
                AppError::ServiceUnavailable("Storage temporarily unavailable".to_string())
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

impl ServiceError {
    /// Collapse tenant-hiding errors into a uniform not-found for id-addressed
    /// routes, so another tenant's ids and out-of-scope homes look absent.
    pub fn hide_existence(self) -> Self {
        match self {
            ServiceError::CrossTenantViolation | ServiceError::InsufficientHomeScope => {
                ServiceError::NotFound
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::{http::StatusCode, response::IntoResponse};

    fn status(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(status(ServiceError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::NoOrganizationContext), StatusCode::FORBIDDEN);
        assert_eq!(status(ServiceError::OrphanUser), StatusCode::FORBIDDEN);
        assert_eq!(status(ServiceError::NotAMember), StatusCode::FORBIDDEN);
        assert_eq!(status(ServiceError::CrossTenantViolation), StatusCode::FORBIDDEN);
        assert_eq!(status(ServiceError::InsufficientHomeScope), StatusCode::NOT_FOUND);
        assert_eq!(status(ServiceError::LastOwnerRemovalRejected), StatusCode::CONFLICT);
        assert_eq!(
            status(ServiceError::AuditWriteFailure("disk full".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn hiding_collapses_scope_errors_into_not_found() {
        assert!(matches!(
            ServiceError::CrossTenantViolation.hide_existence(),
            ServiceError::NotFound
        ));
        assert!(matches!(
            ServiceError::InsufficientHomeScope.hide_existence(),
            ServiceError::NotFound
        ));
        assert!(matches!(
            ServiceError::NotAMember.hide_existence(),
            ServiceError::NotAMember
        ));
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::GlobalRole;
use crate::services::TenantContext;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SelectOrganizationRequest {
    #[validate(length(min = 1, message = "Selection token is required"))]
    pub selection_token: String,
    pub organization_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SwitchOrganizationRequest {
    pub organization_id: Uuid,
}

/// The caller as the service sees them for this request.
#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub user_id: Uuid,
    pub email: String,
    pub global_roles: Vec<GlobalRole>,
    pub organization: Option<TenantContext>,
}

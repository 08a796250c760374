use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Organization, OrganizationMembership};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 12, message = "Password must be at least 12 characters"))]
    pub password: String,

    #[validate(length(max = 200))]
    pub display_name: Option<String>,

    #[serde(default)]
    pub sysadmin: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 200, message = "Organization name is required"))]
    pub name: String,

    #[validate(email(message = "Invalid owner email format"))]
    pub owner_email: String,
}

#[derive(Debug, Serialize)]
pub struct CreateOrganizationResponse {
    pub organization: Organization,
    pub owner: OrganizationMembership,
}

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::OrgRole;

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub role: OrgRole,
    #[serde(default)]
    pub is_owner: bool,
}

/// Exactly one of `role` and `is_owner` per request.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMemberRequest {
    pub role: Option<OrgRole>,
    pub is_owner: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransferOwnershipRequest {
    pub to_user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignCaregiverRequest {
    pub user_id: Uuid,
}

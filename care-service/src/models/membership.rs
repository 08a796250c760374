//! Organization membership - links a user to a tenant with an org-scoped role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrgRole {
    Admin,
    Caregiver,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Admin => "Admin",
            OrgRole::Caregiver => "Caregiver",
        }
    }
}

impl std::str::FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(OrgRole::Admin),
            "Caregiver" => Ok(OrgRole::Caregiver),
            _ => Err(format!("Invalid organization role: {}", s)),
        }
    }
}

/// At most one membership exists per (user, organization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: OrgRole,
    pub is_owner: bool,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

impl OrganizationMembership {
    pub fn new(user_id: Uuid, organization_id: Uuid, role: OrgRole, is_owner: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            organization_id,
            role,
            is_owner,
            joined_at: Utc::now(),
            is_active: true,
        }
    }

    pub fn is_active_owner(&self) -> bool {
        self.is_active && self.is_owner
    }
}

/// Candidate organization offered during organization selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSummary {
    pub organization_id: Uuid,
    pub name: String,
    pub role: OrgRole,
    pub is_owner: bool,
}

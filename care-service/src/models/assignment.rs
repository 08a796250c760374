use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Grants a caregiver access to one home. Unique per (user, home).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaregiverHomeAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub home_id: Uuid,
    pub organization_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<Uuid>,
    pub is_active: bool,
}

impl CaregiverHomeAssignment {
    pub fn new(user_id: Uuid, home_id: Uuid, organization_id: Uuid, assigned_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            home_id,
            organization_id,
            assigned_at: Utc::now(),
            assigned_by: Some(assigned_by),
            is_active: true,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::AuditOutcome;
use crate::services::AuditQuery;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQueryParams {
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub unscoped: bool,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub user_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub continuation: Option<String>,
}

impl From<AuditQueryParams> for AuditQuery {
    fn from(p: AuditQueryParams) -> Self {
        AuditQuery {
            organization_id: p.organization_id,
            unscoped: p.unscoped,
            from: p.from,
            to: p.to,
            action: p.action,
            outcome: p.outcome,
            user_id: p.user_id,
            limit: p.limit,
            continuation: p.continuation,
        }
    }
}

//! Tenant-scoped records.
//!
//! Homes, beds, clients, care logs, appointments, activities, incidents,
//! documents and document folders share one shape: an organization id, an
//! optional home id (denormalized from the parent), and a JSON payload. The
//! payload is PHI and never leaves the service except in a response body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Home,
    Bed,
    Client,
    CareLog,
    Appointment,
    Activity,
    Incident,
    Document,
    DocumentFolder,
}

impl RecordKind {
    pub const ALL: [RecordKind; 9] = [
        RecordKind::Home,
        RecordKind::Bed,
        RecordKind::Client,
        RecordKind::CareLog,
        RecordKind::Appointment,
        RecordKind::Activity,
        RecordKind::Incident,
        RecordKind::Document,
        RecordKind::DocumentFolder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Home => "home",
            RecordKind::Bed => "bed",
            RecordKind::Client => "client",
            RecordKind::CareLog => "care_log",
            RecordKind::Appointment => "appointment",
            RecordKind::Activity => "activity",
            RecordKind::Incident => "incident",
            RecordKind::Document => "document",
            RecordKind::DocumentFolder => "document_folder",
        }
    }

    /// Kinds that always hang off a home. Documents and folders may be
    /// organization-wide.
    pub fn requires_home(&self) -> bool {
        !matches!(
            self,
            RecordKind::Home | RecordKind::Document | RecordKind::DocumentFolder
        )
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Invalid record kind: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: Uuid,
    pub kind: RecordKind,
    pub organization_id: Uuid,
    pub home_id: Option<Uuid>,
    pub is_active: bool,
    pub data: serde_json::Value,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert request. `organization_id` is what the caller claims; the
/// isolation filter rejects it unless it matches the session context.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub kind: RecordKind,
    pub organization_id: Uuid,
    pub home_id: Option<Uuid>,
    pub data: serde_json::Value,
}

/// Partial update. A supplied `organization_id` must match the session.
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub organization_id: Option<Uuid>,
    pub home_id: Option<Uuid>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub home_id: Option<Uuid>,
    pub include_inactive: bool,
}

impl RecordFilter {
    pub fn of_kind(kind: RecordKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &TenantRecord) -> bool {
        self.kind.is_none_or(|k| k == record.kind)
            && self.home_id.is_none_or(|h| record.home_id == Some(h))
            && (self.include_inactive || record.is_active)
    }
}

/// Where a record lives, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordLocation {
    pub record_id: Uuid,
    pub kind: RecordKind,
    pub organization_id: Uuid,
    pub home_id: Option<Uuid>,
}

impl From<&TenantRecord> for RecordLocation {
    fn from(r: &TenantRecord) -> Self {
        Self {
            record_id: r.id,
            kind: r.kind,
            organization_id: r.organization_id,
            home_id: r.home_id,
        }
    }
}

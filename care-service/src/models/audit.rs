//! Audit log entries.
//!
//! Entries are created once and never modified. Nothing in this crate exposes
//! a mutation path: `AuditStore` offers `append` and `query` only, and the
//! database rejects UPDATE/DELETE on the table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "Success",
            AuditOutcome::Failure => "Failure",
            AuditOutcome::Denied => "Denied",
        }
    }
}

impl std::str::FromStr for AuditOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(AuditOutcome::Success),
            "Failure" => Ok(AuditOutcome::Failure),
            "Denied" => Ok(AuditOutcome::Denied),
            _ => Err(format!("Invalid audit outcome: {}", s)),
        }
    }
}

/// Action codes recorded in `AuditLogEntry::action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Login,
    Lockout,
    SelectOrganization,
    SwitchOrganization,
    RecordRead,
    RecordList,
    RecordCreate,
    RecordUpdate,
    RecordDeactivate,
    BypassQuery,
    BypassGet,
    BypassLocate,
    MemberAdd,
    MemberRoleChange,
    MemberOwnerChange,
    MemberDeactivate,
    OwnershipTransfer,
    CaregiverAssign,
    CaregiverUnassign,
    AuditQuery,
    OrganizationCreate,
    UserCreate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "auth.login",
            AuditAction::Lockout => "auth.lockout",
            AuditAction::SelectOrganization => "auth.select_organization",
            AuditAction::SwitchOrganization => "auth.switch_organization",
            AuditAction::RecordRead => "record.read",
            AuditAction::RecordList => "record.list",
            AuditAction::RecordCreate => "record.create",
            AuditAction::RecordUpdate => "record.update",
            AuditAction::RecordDeactivate => "record.deactivate",
            AuditAction::BypassQuery => "bypass.query_all_tenants",
            AuditAction::BypassGet => "bypass.get_ignoring_filter",
            AuditAction::BypassLocate => "bypass.locate",
            AuditAction::MemberAdd => "membership.add",
            AuditAction::MemberRoleChange => "membership.change_role",
            AuditAction::MemberOwnerChange => "membership.set_owner",
            AuditAction::MemberDeactivate => "membership.deactivate",
            AuditAction::OwnershipTransfer => "membership.transfer_ownership",
            AuditAction::CaregiverAssign => "assignment.assign",
            AuditAction::CaregiverUnassign => "assignment.unassign",
            AuditAction::AuditQuery => "audit.query",
            AuditAction::OrganizationCreate => "organization.create",
            AuditAction::UserCreate => "user.create",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Partition key. `None` is the unscoped partition used for
    /// authentication events before an organization is resolved.
    pub organization_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    /// Set for Sysadmin cross-tenant access.
    pub privileged: bool,
}

/// Builder for an entry that has not been stamped yet.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    organization_id: Option<Uuid>,
    user_id: Option<Uuid>,
    user_email: Option<String>,
    action: AuditAction,
    resource_type: Option<String>,
    resource_id: Option<String>,
    outcome: AuditOutcome,
    ip_address: Option<String>,
    details: Option<String>,
    privileged: bool,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            organization_id: None,
            user_id: None,
            user_email: None,
            action,
            resource_type: None,
            resource_id: None,
            outcome,
            ip_address: None,
            details: None,
            privileged: false,
        }
    }

    pub fn organization(mut self, organization_id: Option<Uuid>) -> Self {
        self.organization_id = organization_id;
        self
    }

    pub fn actor(mut self, user_id: Option<Uuid>, email: Option<&str>) -> Self {
        self.user_id = user_id;
        self.user_email = email.map(str::to_string);
        self
    }

    pub fn resource(mut self, resource_type: &str, resource_id: Option<String>) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = resource_id;
        self
    }

    pub fn ip(mut self, ip_address: Option<&str>) -> Self {
        self.ip_address = ip_address.map(str::to_string);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn outcome(&self) -> AuditOutcome {
        self.outcome
    }

    /// Assign id and timestamp.
    pub fn stamp(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            organization_id: self.organization_id,
            user_id: self.user_id,
            user_email: self.user_email,
            action: self.action.as_str().to_string(),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            outcome: self.outcome,
            ip_address: self.ip_address,
            details: self.details,
            privileged: self.privileged,
        }
    }
}

/// Which partition a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPartition {
    Organization(Uuid),
    Unscoped,
    /// Every partition. Sysadmin only.
    All,
}

/// Keyset position: entries strictly older than this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCursor {
    pub timestamp: DateTime<Utc>,
    pub id: Uuid,
}

impl AuditCursor {
    pub fn after(entry: &AuditLogEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            id: entry.id,
        }
    }

    /// Newest-first ordering: (timestamp desc, id desc).
    pub fn precedes(&self, entry: &AuditLogEntry) -> bool {
        (entry.timestamp, entry.id) < (self.timestamp, self.id)
    }
}

#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub partition: AuditPartition,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub user_id: Option<Uuid>,
    pub cursor: Option<AuditCursor>,
}

impl AuditFilter {
    pub fn partition(partition: AuditPartition) -> Self {
        Self {
            partition,
            from: None,
            to: None,
            action: None,
            outcome: None,
            user_id: None,
            cursor: None,
        }
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        let in_partition = match self.partition {
            AuditPartition::Organization(id) => entry.organization_id == Some(id),
            AuditPartition::Unscoped => entry.organization_id.is_none(),
            AuditPartition::All => true,
        };
        in_partition
            && self.from.is_none_or(|from| entry.timestamp >= from)
            && self.to.is_none_or(|to| entry.timestamp < to)
            && self.action.as_deref().is_none_or(|a| entry.action == a)
            && self.outcome.is_none_or(|o| entry.outcome == o)
            && self.user_id.is_none_or(|u| entry.user_id == Some(u))
            && self.cursor.is_none_or(|c| c.precedes(entry))
    }
}

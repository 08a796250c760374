//! Authorization policies.
//!
//! Pure functions from (context, action, resource) to a decision. Handlers and
//! services call them explicitly before touching data; nothing here performs
//! I/O, so any context can be constructed directly in tests.

use metrics::counter;

use crate::models::{OrgRole, RecordKind};
use crate::services::context::{Principal, TenantContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Deactivate,
    ManageMembers,
    ManageOwnership,
    ManageAssignments,
    QueryAudit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Record(RecordKind),
    /// A membership row; `target_is_owner` is the row's current owner flag.
    Membership { target_is_owner: bool },
    Assignment,
    AuditLog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Kinds a caregiver may create and update inside their home scope.
fn caregiver_writable(kind: RecordKind) -> bool {
    matches!(
        kind,
        RecordKind::Bed
            | RecordKind::Client
            | RecordKind::CareLog
            | RecordKind::Appointment
            | RecordKind::Activity
            | RecordKind::Incident
            | RecordKind::Document
    )
}

pub fn authorize(ctx: &TenantContext, action: Action, resource: Resource) -> Decision {
    let decision = evaluate(ctx, action, resource);
    record_decision(&decision);
    decision
}

fn evaluate(ctx: &TenantContext, action: Action, resource: Resource) -> Decision {
    let is_admin = ctx.org_role == OrgRole::Admin;

    match (resource, action) {
        (Resource::Record(_), Action::Read) => Decision::Allow,
        (Resource::Record(_), Action::Create | Action::Update) if is_admin => Decision::Allow,
        (Resource::Record(kind), Action::Create | Action::Update) => {
            if caregiver_writable(kind) {
                Decision::Allow
            } else {
                Decision::Deny("caregivers cannot modify this record kind")
            }
        }
        (Resource::Record(_), Action::Deactivate) if is_admin => Decision::Allow,
        (Resource::Record(_), Action::Deactivate) => {
            Decision::Deny("only admins can deactivate records")
        }

        (Resource::Membership { .. }, Action::ManageOwnership) => {
            if ctx.is_owner {
                Decision::Allow
            } else {
                Decision::Deny("only owners can change ownership")
            }
        }
        (Resource::Membership { target_is_owner }, Action::ManageMembers) => {
            if !is_admin {
                Decision::Deny("only admins can manage members")
            } else if target_is_owner && !ctx.is_owner {
                Decision::Deny("only owners can modify an owner's membership")
            } else {
                Decision::Allow
            }
        }

        (Resource::Assignment, Action::ManageAssignments) if is_admin => Decision::Allow,
        (Resource::Assignment, Action::ManageAssignments) => {
            Decision::Deny("only admins can manage caregiver assignments")
        }

        (Resource::AuditLog, Action::QueryAudit) if is_admin => Decision::Allow,
        (Resource::AuditLog, Action::QueryAudit) => {
            Decision::Deny("audit log is restricted to admins")
        }

        _ => Decision::Deny("action not applicable to resource"),
    }
}

/// Cross-tenant bypass and cross-partition audit reads require the global
/// Sysadmin role, independent of any membership.
pub fn authorize_bypass(principal: &Principal) -> Decision {
    let decision = if principal.is_sysadmin() {
        Decision::Allow
    } else {
        Decision::Deny("bypass requires the Sysadmin role")
    };
    record_decision(&decision);
    decision
}

fn record_decision(decision: &Decision) {
    let label = if decision.is_allowed() { "allow" } else { "deny" };
    counter!("authz_decisions_total", "decision" => label).increment(1);
}

//! Organization membership management.
//!
//! `plan_membership_change` is the single place the membership invariants
//! live: one membership per (user, organization), only an active owner may
//! grant or revoke ownership or modify an owner's row, and an organization
//! never drops to zero active owners. Stores call it while holding the
//! organization's lock so concurrent changes are planned against fresh rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuditAction, AuditOutcome, NewAuditEntry, OrgRole, OrganizationMembership};
use crate::services::audit::AuditWriter;
use crate::services::context::TenantContext;
use crate::services::error::ServiceError;
use crate::services::policy::{self, Action, Decision, Resource};
use crate::services::store::{CareStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipChange {
    Add {
        user_id: Uuid,
        role: OrgRole,
        is_owner: bool,
    },
    ChangeRole {
        user_id: Uuid,
        role: OrgRole,
    },
    SetOwner {
        user_id: Uuid,
        is_owner: bool,
    },
    Deactivate {
        user_id: Uuid,
    },
    TransferOwnership {
        from_user_id: Uuid,
        to_user_id: Uuid,
    },
}

impl MembershipChange {
    fn audit_action(&self) -> AuditAction {
        match self {
            MembershipChange::Add { .. } => AuditAction::MemberAdd,
            MembershipChange::ChangeRole { .. } => AuditAction::MemberRoleChange,
            MembershipChange::SetOwner { .. } => AuditAction::MemberOwnerChange,
            MembershipChange::Deactivate { .. } => AuditAction::MemberDeactivate,
            MembershipChange::TransferOwnership { .. } => AuditAction::OwnershipTransfer,
        }
    }

    fn target(&self) -> Uuid {
        match self {
            MembershipChange::Add { user_id, .. }
            | MembershipChange::ChangeRole { user_id, .. }
            | MembershipChange::SetOwner { user_id, .. }
            | MembershipChange::Deactivate { user_id } => *user_id,
            MembershipChange::TransferOwnership { to_user_id, .. } => *to_user_id,
        }
    }

    /// Whether the change can grant or revoke ownership on its own.
    fn touches_ownership(&self) -> bool {
        matches!(
            self,
            MembershipChange::Add { is_owner: true, .. }
                | MembershipChange::SetOwner { .. }
                | MembershipChange::TransferOwnership { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipRejection {
    #[error("the last active owner cannot be removed or demoted")]
    LastOwner,
    #[error("user is already an active member")]
    AlreadyMember,
    #[error("user is not an active member")]
    NotMember,
    #[error("only an active owner can change ownership or modify an owner")]
    NotOwner,
    #[error("ownership must be transferred to a different member")]
    SelfTransfer,
}

impl From<MembershipRejection> for ServiceError {
    fn from(rejection: MembershipRejection) -> Self {
        match rejection {
            MembershipRejection::LastOwner => ServiceError::LastOwnerRemovalRejected,
            MembershipRejection::AlreadyMember => ServiceError::Conflict(rejection.to_string()),
            MembershipRejection::NotMember => ServiceError::NotFound,
            MembershipRejection::NotOwner => ServiceError::Forbidden,
            MembershipRejection::SelfTransfer => ServiceError::Validation(rejection.to_string()),
        }
    }
}

fn active<'a>(
    current: &'a [OrganizationMembership],
    user_id: Uuid,
) -> Result<&'a OrganizationMembership, MembershipRejection> {
    current
        .iter()
        .find(|m| m.user_id == user_id && m.is_active)
        .ok_or(MembershipRejection::NotMember)
}

fn owner_count(rows: &[OrganizationMembership]) -> usize {
    rows.iter().filter(|m| m.is_active_owner()).count()
}

fn is_active_owner(current: &[OrganizationMembership], user_id: Uuid) -> bool {
    current
        .iter()
        .any(|m| m.user_id == user_id && m.is_active_owner())
}

/// Compute the rows to write for `change`, requested by `actor_user_id`,
/// against the organization's current memberships. Owners always hold the
/// Admin role.
pub fn plan_membership_change(
    org_id: Uuid,
    actor_user_id: Uuid,
    current: &[OrganizationMembership],
    change: &MembershipChange,
    now: DateTime<Utc>,
) -> Result<Vec<OrganizationMembership>, MembershipRejection> {
    let owner_protected = change.touches_ownership() || is_active_owner(current, change.target());
    if owner_protected && !is_active_owner(current, actor_user_id) {
        return Err(MembershipRejection::NotOwner);
    }

    let writes = match change {
        MembershipChange::Add {
            user_id,
            role,
            is_owner,
        } => {
            let role = if *is_owner { OrgRole::Admin } else { *role };
            match current.iter().find(|m| m.user_id == *user_id) {
                Some(m) if m.is_active => return Err(MembershipRejection::AlreadyMember),
                Some(m) => vec![OrganizationMembership {
                    role,
                    is_owner: *is_owner,
                    is_active: true,
                    joined_at: now,
                    ..m.clone()
                }],
                None => {
                    let mut m = OrganizationMembership::new(*user_id, org_id, role, *is_owner);
                    m.joined_at = now;
                    vec![m]
                }
            }
        }
        MembershipChange::ChangeRole { user_id, role } => {
            let m = active(current, *user_id)?;
            vec![OrganizationMembership {
                role: *role,
                is_owner: m.is_owner && *role == OrgRole::Admin,
                ..m.clone()
            }]
        }
        MembershipChange::SetOwner { user_id, is_owner } => {
            let m = active(current, *user_id)?;
            vec![OrganizationMembership {
                role: if *is_owner { OrgRole::Admin } else { m.role },
                is_owner: *is_owner,
                ..m.clone()
            }]
        }
        MembershipChange::Deactivate { user_id } => {
            let m = active(current, *user_id)?;
            vec![OrganizationMembership {
                is_active: false,
                is_owner: false,
                ..m.clone()
            }]
        }
        MembershipChange::TransferOwnership {
            from_user_id,
            to_user_id,
        } => {
            if from_user_id == to_user_id {
                return Err(MembershipRejection::SelfTransfer);
            }
            let from = active(current, *from_user_id)?;
            if !from.is_owner {
                return Err(MembershipRejection::NotOwner);
            }
            let to = active(current, *to_user_id)?;
            vec![
                OrganizationMembership {
                    role: OrgRole::Admin,
                    is_owner: true,
                    ..to.clone()
                },
                OrganizationMembership {
                    is_owner: false,
                    ..from.clone()
                },
            ]
        }
    };

    let after: Vec<OrganizationMembership> = current
        .iter()
        .filter(|m| !writes.iter().any(|w| w.id == m.id))
        .chain(writes.iter())
        .cloned()
        .collect();

    if owner_count(current) > 0 && owner_count(&after) == 0 {
        return Err(MembershipRejection::LastOwner);
    }

    Ok(writes)
}

#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn CareStore>,
    audit: AuditWriter,
}

impl MembershipService {
    pub fn new(store: Arc<dyn CareStore>, audit: AuditWriter) -> Self {
        Self { store, audit }
    }

    pub async fn list_members(
        &self,
        ctx: &TenantContext,
    ) -> Result<Vec<OrganizationMembership>, ServiceError> {
        Ok(self.store.list_memberships(ctx.organization_id).await?)
    }

    pub async fn add_member(
        &self,
        ctx: &TenantContext,
        email: &str,
        role: OrgRole,
        is_owner: bool,
        ip: Option<&str>,
    ) -> Result<OrganizationMembership, ServiceError> {
        let user = self
            .store
            .find_user_by_email(&email.trim().to_lowercase())
            .await?
            .filter(|u| u.is_active);

        let Some(user) = user else {
            let entry = NewAuditEntry::new(AuditAction::MemberAdd, AuditOutcome::Failure)
                .organization(Some(ctx.organization_id))
                .actor(Some(ctx.user_id), Some(&ctx.email))
                .resource("membership", None)
                .ip(ip)
                .details("no active user with that email");
            return Err(self.audit.reject(entry, ServiceError::NotFound).await);
        };

        let rows = self
            .apply(
                ctx,
                MembershipChange::Add {
                    user_id: user.id,
                    role,
                    is_owner,
                },
                ip,
            )
            .await?;
        rows.into_iter()
            .find(|m| m.user_id == user.id)
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("membership write lost")))
    }

    pub async fn change_role(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
        role: OrgRole,
        ip: Option<&str>,
    ) -> Result<Vec<OrganizationMembership>, ServiceError> {
        self.apply(ctx, MembershipChange::ChangeRole { user_id, role }, ip)
            .await
    }

    pub async fn set_owner(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
        is_owner: bool,
        ip: Option<&str>,
    ) -> Result<Vec<OrganizationMembership>, ServiceError> {
        self.apply(ctx, MembershipChange::SetOwner { user_id, is_owner }, ip)
            .await
    }

    pub async fn deactivate_member(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<Vec<OrganizationMembership>, ServiceError> {
        self.apply(ctx, MembershipChange::Deactivate { user_id }, ip)
            .await
    }

    /// Hand the caller's ownership to another active member.
    pub async fn transfer_ownership(
        &self,
        ctx: &TenantContext,
        to_user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<Vec<OrganizationMembership>, ServiceError> {
        self.apply(
            ctx,
            MembershipChange::TransferOwnership {
                from_user_id: ctx.user_id,
                to_user_id,
            },
            ip,
        )
        .await
    }

    async fn apply(
        &self,
        ctx: &TenantContext,
        change: MembershipChange,
        ip: Option<&str>,
    ) -> Result<Vec<OrganizationMembership>, ServiceError> {
        let target = change.target();
        let entry = |outcome| {
            NewAuditEntry::new(change.audit_action(), outcome)
                .organization(Some(ctx.organization_id))
                .actor(Some(ctx.user_id), Some(&ctx.email))
                .resource("membership", Some(target.to_string()))
                .ip(ip)
        };

        let target_is_owner = self
            .store
            .find_membership(target, ctx.organization_id)
            .await?
            .is_some_and(|m| m.is_active_owner());
        let action = if change.touches_ownership() {
            Action::ManageOwnership
        } else {
            Action::ManageMembers
        };

        if let Decision::Deny(reason) =
            policy::authorize(ctx, action, Resource::Membership { target_is_owner })
        {
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Denied).details(reason), ServiceError::Forbidden)
                .await);
        }

        let stamped = entry(AuditOutcome::Success).stamp();
        match self
            .store
            .apply_membership_change(ctx.organization_id, ctx.user_id, &change, &stamped)
            .await
        {
            Ok(rows) => {
                AuditWriter::committed(&stamped);
                tracing::info!(
                    organization_id = %ctx.organization_id,
                    target_user_id = %target,
                    action = change.audit_action().as_str(),
                    "Membership changed"
                );
                Ok(rows)
            }
            Err(StoreError::Rejected(rejection)) => {
                tracing::warn!(
                    organization_id = %ctx.organization_id,
                    target_user_id = %target,
                    reason = %rejection,
                    "Membership change rejected"
                );
                // Ownership lost between the policy check and the lock
                let outcome = if rejection == MembershipRejection::NotOwner {
                    AuditOutcome::Denied
                } else {
                    AuditOutcome::Failure
                };
                Err(self
                    .audit
                    .reject(entry(outcome).details(rejection.to_string()), rejection.into())
                    .await)
            }
            Err(e) => Err(e.into()),
        }
    }
}

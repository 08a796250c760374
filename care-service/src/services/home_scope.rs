//! Home-scope authorizer.
//!
//! Caregivers only see records rooted at homes they are assigned to. The
//! assignment set is read from the store on every call and never cached
//! across requests.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditOutcome, CaregiverHomeAssignment, NewAuditEntry, OrgRole, RecordKind,
    TenantRecord,
};
use crate::services::audit::AuditWriter;
use crate::services::context::TenantContext;
use crate::services::error::ServiceError;
use crate::services::policy::{self, Action, Decision, Resource};
use crate::services::store::CareStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeScope {
    /// Admins: every home in the organization.
    All,
    /// Caregivers: the assigned homes. May be empty.
    Homes(HashSet<Uuid>),
}

impl HomeScope {
    /// Records without a home id are organization-wide and visible to `All` only.
    pub fn authorize(&self, home_id: Option<Uuid>) -> bool {
        match (self, home_id) {
            (HomeScope::All, _) => true,
            (HomeScope::Homes(homes), Some(home)) => homes.contains(&home),
            (HomeScope::Homes(_), None) => false,
        }
    }

    pub fn authorize_record(&self, record: &TenantRecord) -> bool {
        self.authorize(record.home_id)
    }
}

#[derive(Clone)]
pub struct HomeScopeService {
    store: Arc<dyn CareStore>,
    audit: AuditWriter,
}

impl HomeScopeService {
    pub fn new(store: Arc<dyn CareStore>, audit: AuditWriter) -> Self {
        Self { store, audit }
    }

    pub async fn allowed_home_ids(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<HashSet<Uuid>, ServiceError> {
        Ok(self.store.active_home_ids(user_id, organization_id).await?)
    }

    pub async fn scope_for(&self, ctx: &TenantContext) -> Result<HomeScope, ServiceError> {
        match ctx.org_role {
            OrgRole::Admin => Ok(HomeScope::All),
            OrgRole::Caregiver => Ok(HomeScope::Homes(
                self.allowed_home_ids(ctx.user_id, ctx.organization_id)
                    .await?,
            )),
        }
    }

    pub async fn assign(
        &self,
        ctx: &TenantContext,
        home_id: Uuid,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<CaregiverHomeAssignment, ServiceError> {
        let entry = |outcome| {
            NewAuditEntry::new(AuditAction::CaregiverAssign, outcome)
                .organization(Some(ctx.organization_id))
                .actor(Some(ctx.user_id), Some(&ctx.email))
                .resource("caregiver_home_assignment", Some(format!("{}:{}", user_id, home_id)))
                .ip(ip)
        };

        self.check_assignment_target(
            ctx,
            home_id,
            user_id,
            entry(AuditOutcome::Denied),
            entry(AuditOutcome::Failure),
        )
        .await?;

        let assignment =
            CaregiverHomeAssignment::new(user_id, home_id, ctx.organization_id, ctx.user_id);
        let stamped = entry(AuditOutcome::Success).stamp();
        let stored = self
            .store
            .upsert_assignment_audited(&assignment, &stamped)
            .await?;
        AuditWriter::committed(&stamped);

        tracing::info!(
            organization_id = %ctx.organization_id,
            home_id = %home_id,
            user_id = %user_id,
            "Caregiver assigned to home"
        );
        Ok(stored)
    }

    pub async fn unassign(
        &self,
        ctx: &TenantContext,
        home_id: Uuid,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        let entry = |outcome| {
            NewAuditEntry::new(AuditAction::CaregiverUnassign, outcome)
                .organization(Some(ctx.organization_id))
                .actor(Some(ctx.user_id), Some(&ctx.email))
                .resource("caregiver_home_assignment", Some(format!("{}:{}", user_id, home_id)))
                .ip(ip)
        };

        if let Decision::Deny(reason) =
            policy::authorize(ctx, Action::ManageAssignments, Resource::Assignment)
        {
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Denied).details(reason), ServiceError::Forbidden)
                .await);
        }

        let stamped = entry(AuditOutcome::Success).stamp();
        match self
            .store
            .deactivate_assignment_audited(ctx.organization_id, user_id, home_id, &stamped)
            .await
        {
            Ok(()) => {
                AuditWriter::committed(&stamped);
                Ok(())
            }
            Err(e) => {
                let err = ServiceError::from(e);
                if matches!(err, ServiceError::NotFound) {
                    return Err(self
                        .audit
                        .reject(
                            entry(AuditOutcome::Failure).details("no active assignment"),
                            err,
                        )
                        .await);
                }
                Err(err)
            }
        }
    }

    async fn check_assignment_target(
        &self,
        ctx: &TenantContext,
        home_id: Uuid,
        user_id: Uuid,
        denied: NewAuditEntry,
        failed: NewAuditEntry,
    ) -> Result<(), ServiceError> {
        if let Decision::Deny(reason) =
            policy::authorize(ctx, Action::ManageAssignments, Resource::Assignment)
        {
            return Err(self
                .audit
                .reject(denied.details(reason), ServiceError::Forbidden)
                .await);
        }

        let home = self
            .store
            .find_record(ctx.organization_id, RecordKind::Home, home_id)
            .await?
            .filter(|h| h.is_active);
        if home.is_none() {
            return Err(self
                .audit
                .reject(failed.details("home not found in organization"), ServiceError::NotFound)
                .await);
        }

        let membership = self
            .store
            .find_membership(user_id, ctx.organization_id)
            .await?
            .filter(|m| m.is_active);
        match membership {
            Some(m) if m.role == OrgRole::Caregiver => Ok(()),
            Some(_) => Err(self
                .audit
                .reject(
                    failed.details("target member is not a caregiver"),
                    ServiceError::Validation("only caregivers can be assigned to homes".into()),
                )
                .await),
            None => Err(self
                .audit
                .reject(failed.details("target is not an active member"), ServiceError::NotFound)
                .await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_is_valid_and_denies_everything() {
        let scope = HomeScope::Homes(HashSet::new());
        assert!(!scope.authorize(Some(Uuid::new_v4())));
        assert!(!scope.authorize(None));
    }

    #[test]
    fn caregivers_see_only_assigned_homes() {
        let h1 = Uuid::new_v4();
        let h2 = Uuid::new_v4();
        let scope = HomeScope::Homes(HashSet::from([h1]));
        assert!(scope.authorize(Some(h1)));
        assert!(!scope.authorize(Some(h2)));
    }

    #[test]
    fn organization_wide_records_need_full_scope() {
        assert!(HomeScope::All.authorize(None));
        assert!(!HomeScope::Homes(HashSet::from([Uuid::new_v4()])).authorize(None));
    }
}

//! Operator onboarding: creating users and organizations.
//!
//! Reached only through the admin API key routes. Each creation is committed
//! together with its audit entry.

use std::sync::Arc;

use crate::models::{
    AuditAction, AuditOutcome, GlobalRole, NewAuditEntry, OrgRole, Organization,
    OrganizationMembership, SanitizedUser, User,
};
use crate::services::audit::AuditWriter;
use crate::services::error::ServiceError;
use crate::services::store::{CareStore, StoreError};
use crate::utils::password::{hash_password, Password};

const OPERATOR: &str = "admin-api-key";

#[derive(Clone)]
pub struct OnboardingService {
    store: Arc<dyn CareStore>,
    audit: AuditWriter,
}

impl OnboardingService {
    pub fn new(store: Arc<dyn CareStore>, audit: AuditWriter) -> Self {
        Self { store, audit }
    }

    pub async fn create_user(
        &self,
        email: &str,
        display_name: Option<String>,
        password: &Password,
        sysadmin: bool,
        ip: Option<&str>,
    ) -> Result<SanitizedUser, ServiceError> {
        let hash = hash_password(password)?;
        let mut user = User::new(email, display_name, hash);
        if sysadmin {
            user = user.with_global_role(GlobalRole::Sysadmin);
        }

        let entry = |outcome| {
            NewAuditEntry::new(AuditAction::UserCreate, outcome)
                .actor(None, Some(OPERATOR))
                .resource("user", Some(user.id.to_string()))
                .ip(ip)
        };

        let stamped = entry(AuditOutcome::Success)
            .details(if sysadmin { "global role Sysadmin" } else { "no global role" })
            .stamp();
        match self.store.insert_user_audited(&user, &stamped).await {
            Ok(()) => {
                AuditWriter::committed(&stamped);
                tracing::info!(user_id = %user.id, sysadmin, "User created");
                Ok(user.sanitize())
            }
            Err(StoreError::Conflict(msg)) => Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Failure).details(msg.clone()),
                    ServiceError::Conflict(msg),
                )
                .await),
            Err(e) => Err(e.into()),
        }
    }

    /// Create an organization with `owner_email` as its first owner.
    pub async fn create_organization(
        &self,
        name: &str,
        owner_email: &str,
        ip: Option<&str>,
    ) -> Result<(Organization, OrganizationMembership), ServiceError> {
        let org = Organization::new(name.trim());
        let entry = |outcome| {
            NewAuditEntry::new(AuditAction::OrganizationCreate, outcome)
                .actor(None, Some(OPERATOR))
                .resource("organization", Some(org.id.to_string()))
                .ip(ip)
        };

        let owner = self
            .store
            .find_user_by_email(&owner_email.trim().to_lowercase())
            .await?
            .filter(|u| u.is_active);
        let Some(owner) = owner else {
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Failure).details("owner is not an active user"),
                    ServiceError::NotFound,
                )
                .await);
        };

        let membership = OrganizationMembership::new(owner.id, org.id, OrgRole::Admin, true);
        let stamped = entry(AuditOutcome::Success)
            .organization(Some(org.id))
            .details(format!("owner {}", owner.id))
            .stamp();
        self.store
            .create_organization_audited(&org, &membership, &stamped)
            .await?;
        AuditWriter::committed(&stamped);

        tracing::info!(organization_id = %org.id, owner_id = %owner.id, "Organization created");
        Ok((org, membership))
    }
}

//! Persistence seam.
//!
//! Every method that touches tenant-scoped rows takes the organization id
//! explicitly; the only unscoped reads (`locate_record`, `list_all_records`)
//! are called from the audited bypass path and the isolation filter's
//! cross-tenant write check.
//!
//! Mutations that need an audit trail take the stamped entry and commit both
//! in one unit. The audit side exposes `append` and `query` only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditLogEntry, CaregiverHomeAssignment, Organization, OrganizationMembership,
    OrganizationSummary, RecordFilter, RecordKind, RecordLocation, TenantRecord, User,
};
use crate::services::membership::{MembershipChange, MembershipRejection};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    #[error("Record not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Membership change rejected: {0}")]
    Rejected(#[from] MembershipRejection),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Per-organization counters used for human-readable numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceScope {
    Homes,
    Incidents { home_id: Uuid },
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Newest first, at most `limit` entries.
    async fn query(&self, filter: &AuditFilter, limit: usize)
        -> Result<Vec<AuditLogEntry>, StoreError>;
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn insert_user_audited(&self, user: &User, audit: &AuditLogEntry)
        -> Result<(), StoreError>;

    /// Increment the consecutive-failure counter, locking the account until
    /// `lock_until` once it reaches `threshold`. Returns the updated user.
    async fn record_login_failure(
        &self,
        user_id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    async fn reset_login_failures(&self, user_id: Uuid) -> Result<(), StoreError>;

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, StoreError>;

    async fn create_organization_audited(
        &self,
        org: &Organization,
        owner: &OrganizationMembership,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError>;

    /// Active memberships in active organizations.
    async fn list_user_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrganizationSummary>, StoreError>;

    async fn find_membership(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<OrganizationMembership>, StoreError>;

    async fn list_memberships(&self, org_id: Uuid)
        -> Result<Vec<OrganizationMembership>, StoreError>;

    /// Plan and apply a membership change while holding the organization's
    /// lock, committing the audit entry with it. Owner rules are checked
    /// against `actor_user_id`'s row as read under the lock. Rejections
    /// leave the memberships untouched and write nothing.
    async fn apply_membership_change(
        &self,
        org_id: Uuid,
        actor_user_id: Uuid,
        change: &MembershipChange,
        audit: &AuditLogEntry,
    ) -> Result<Vec<OrganizationMembership>, StoreError>;

    async fn active_home_ids(&self, user_id: Uuid, org_id: Uuid)
        -> Result<HashSet<Uuid>, StoreError>;

    /// Insert or re-activate the (user, home) assignment.
    async fn upsert_assignment_audited(
        &self,
        assignment: &CaregiverHomeAssignment,
        audit: &AuditLogEntry,
    ) -> Result<CaregiverHomeAssignment, StoreError>;

    /// Returns `NotFound` when no active assignment exists.
    async fn deactivate_assignment_audited(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        home_id: Uuid,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_record(
        &self,
        org_id: Uuid,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Option<TenantRecord>, StoreError>;

    async fn list_records(
        &self,
        org_id: Uuid,
        filter: &RecordFilter,
    ) -> Result<Vec<TenantRecord>, StoreError>;

    async fn insert_record_audited(
        &self,
        record: &TenantRecord,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError>;

    /// Replace the row matching (`record.id`, `org_id`). `NotFound` when the
    /// row is not in that organization.
    async fn update_record_audited(
        &self,
        org_id: Uuid,
        record: &TenantRecord,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError>;

    /// Unfiltered lookup.
    async fn locate_record(&self, id: Uuid) -> Result<Option<RecordLocation>, StoreError>;

    /// Unfiltered lookup returning the payload.
    async fn find_record_any_tenant(&self, id: Uuid) -> Result<Option<TenantRecord>, StoreError>;

    /// Unfiltered listing, optionally narrowed to one organization.
    async fn list_all_records(
        &self,
        org_id: Option<Uuid>,
        filter: &RecordFilter,
    ) -> Result<Vec<TenantRecord>, StoreError>;

    async fn next_sequence(&self, org_id: Uuid, scope: SequenceScope) -> Result<i64, StoreError>;
}

/// Everything the service needs from its backing store.
#[async_trait]
pub trait CareStore: AuditStore + DirectoryStore + RecordStore {
    async fn health_check(&self) -> Result<(), StoreError>;
}

//! In-process store for tests and local development.
//!
//! Audited mutations write the row and the audit entry while holding both
//! locks, so either both land or neither does. Membership changes are
//! serialized per organization with an async mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditLogEntry, CaregiverHomeAssignment, Organization, OrganizationMembership,
    OrganizationSummary, RecordFilter, RecordKind, RecordLocation, TenantRecord, User,
};
use crate::services::membership::{plan_membership_change, MembershipChange};
use crate::services::store::{
    AuditStore, CareStore, DirectoryStore, RecordStore, SequenceScope, StoreError,
};

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, StoreError> {
    mutex
        .lock()
        .map_err(|e| StoreError::Unavailable(format!("Memory store {} mutex poisoned: {}", name, e)))
}

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    organizations: Mutex<HashMap<Uuid, Organization>>,
    memberships: Mutex<HashMap<Uuid, OrganizationMembership>>,
    assignments: Mutex<HashMap<Uuid, CaregiverHomeAssignment>>,
    records: Mutex<HashMap<Uuid, TenantRecord>>,
    sequences: Mutex<HashMap<(Uuid, SequenceScope), i64>>,
    audit: Mutex<Vec<AuditLogEntry>>,
    fail_audit_writes: AtomicBool,
    org_locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent audit append fail.
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert_user(&self, user: User) -> Result<(), StoreError> {
        lock(&self.users, "users")?.insert(user.id, user);
        Ok(())
    }

    pub fn insert_organization(&self, org: Organization) -> Result<(), StoreError> {
        lock(&self.organizations, "organizations")?.insert(org.id, org);
        Ok(())
    }

    pub fn insert_membership(&self, membership: OrganizationMembership) -> Result<(), StoreError> {
        lock(&self.memberships, "memberships")?.insert(membership.id, membership);
        Ok(())
    }

    pub fn insert_assignment(&self, assignment: CaregiverHomeAssignment) -> Result<(), StoreError> {
        lock(&self.assignments, "assignments")?.insert(assignment.id, assignment);
        Ok(())
    }

    pub fn insert_record(&self, record: TenantRecord) -> Result<(), StoreError> {
        lock(&self.records, "records")?.insert(record.id, record);
        Ok(())
    }

    /// Every entry, oldest first.
    pub fn audit_entries(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(lock(&self.audit, "audit")?.clone())
    }

    fn check_audit_writable(&self) -> Result<(), StoreError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(StoreError::AuditWrite("audit sink unavailable".to_string()));
        }
        Ok(())
    }

    fn org_lock(&self, org_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.org_locks.entry(org_id).or_default().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.check_audit_writable()?;
        lock(&self.audit, "audit")?.push(entry.clone());
        Ok(())
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut entries: Vec<AuditLogEntry> = lock(&self.audit, "audit")?
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users, "users")?.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users, "users")?
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user_audited(
        &self,
        user: &User,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut users = lock(&self.users, "users")?;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        let mut log = lock(&self.audit, "audit")?;
        self.check_audit_writable()?;
        users.insert(user.id, user.clone());
        log.push(audit.clone());
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut users = lock(&self.users, "users")?;
        let user = users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.failed_login_attempts += 1;
        if user.failed_login_attempts >= threshold {
            user.locked_until = Some(lock_until);
            user.failed_login_attempts = 0;
        }
        Ok(user.clone())
    }

    async fn reset_login_failures(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut users = lock(&self.users, "users")?;
        if let Some(user) = users.get_mut(&user_id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
        }
        Ok(())
    }

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, StoreError> {
        Ok(lock(&self.organizations, "organizations")?
            .get(&org_id)
            .cloned())
    }

    async fn create_organization_audited(
        &self,
        org: &Organization,
        owner: &OrganizationMembership,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut orgs = lock(&self.organizations, "organizations")?;
        let mut memberships = lock(&self.memberships, "memberships")?;
        let mut log = lock(&self.audit, "audit")?;
        self.check_audit_writable()?;
        orgs.insert(org.id, org.clone());
        memberships.insert(owner.id, owner.clone());
        log.push(audit.clone());
        Ok(())
    }

    async fn list_user_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrganizationSummary>, StoreError> {
        let orgs = lock(&self.organizations, "organizations")?;
        let memberships = lock(&self.memberships, "memberships")?;
        let mut summaries: Vec<OrganizationSummary> = memberships
            .values()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| {
                orgs.get(&m.organization_id)
                    .filter(|o| o.is_active)
                    .map(|o| OrganizationSummary {
                        organization_id: o.id,
                        name: o.name.clone(),
                        role: m.role,
                        is_owner: m.is_owner,
                    })
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<OrganizationMembership>, StoreError> {
        Ok(lock(&self.memberships, "memberships")?
            .values()
            .find(|m| m.user_id == user_id && m.organization_id == org_id)
            .cloned())
    }

    async fn list_memberships(
        &self,
        org_id: Uuid,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        let mut rows: Vec<OrganizationMembership> = lock(&self.memberships, "memberships")?
            .values()
            .filter(|m| m.organization_id == org_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.joined_at);
        Ok(rows)
    }

    async fn apply_membership_change(
        &self,
        org_id: Uuid,
        actor_user_id: Uuid,
        change: &MembershipChange,
        audit: &AuditLogEntry,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        let org_lock = self.org_lock(org_id);
        let _serialized = org_lock.lock().await;

        let mut memberships = lock(&self.memberships, "memberships")?;
        let current: Vec<OrganizationMembership> = memberships
            .values()
            .filter(|m| m.organization_id == org_id)
            .cloned()
            .collect();
        let writes = plan_membership_change(org_id, actor_user_id, &current, change, Utc::now())?;

        let mut log = lock(&self.audit, "audit")?;
        self.check_audit_writable()?;
        for row in &writes {
            memberships.insert(row.id, row.clone());
        }
        log.push(audit.clone());
        Ok(writes)
    }

    async fn active_home_ids(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<HashSet<Uuid>, StoreError> {
        Ok(lock(&self.assignments, "assignments")?
            .values()
            .filter(|a| a.user_id == user_id && a.organization_id == org_id && a.is_active)
            .map(|a| a.home_id)
            .collect())
    }

    async fn upsert_assignment_audited(
        &self,
        assignment: &CaregiverHomeAssignment,
        audit: &AuditLogEntry,
    ) -> Result<CaregiverHomeAssignment, StoreError> {
        let mut assignments = lock(&self.assignments, "assignments")?;
        let mut log = lock(&self.audit, "audit")?;
        self.check_audit_writable()?;

        let existing = assignments
            .values()
            .find(|a| a.user_id == assignment.user_id && a.home_id == assignment.home_id)
            .cloned();
        let stored = match existing {
            Some(existing) => CaregiverHomeAssignment {
                is_active: true,
                assigned_at: assignment.assigned_at,
                assigned_by: assignment.assigned_by,
                ..existing
            },
            None => assignment.clone(),
        };
        assignments.insert(stored.id, stored.clone());
        log.push(audit.clone());
        Ok(stored)
    }

    async fn deactivate_assignment_audited(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        home_id: Uuid,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut assignments = lock(&self.assignments, "assignments")?;
        let mut log = lock(&self.audit, "audit")?;

        let assignment = assignments
            .values_mut()
            .find(|a| {
                a.organization_id == org_id
                    && a.user_id == user_id
                    && a.home_id == home_id
                    && a.is_active
            })
            .ok_or(StoreError::NotFound)?;
        self.check_audit_writable()?;
        assignment.is_active = false;
        log.push(audit.clone());
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_record(
        &self,
        org_id: Uuid,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Option<TenantRecord>, StoreError> {
        Ok(lock(&self.records, "records")?
            .get(&id)
            .filter(|r| r.organization_id == org_id && r.kind == kind)
            .cloned())
    }

    async fn list_records(
        &self,
        org_id: Uuid,
        filter: &RecordFilter,
    ) -> Result<Vec<TenantRecord>, StoreError> {
        self.list_all_records(Some(org_id), filter).await
    }

    async fn insert_record_audited(
        &self,
        record: &TenantRecord,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut records = lock(&self.records, "records")?;
        let mut log = lock(&self.audit, "audit")?;
        self.check_audit_writable()?;
        if records.contains_key(&record.id) {
            return Err(StoreError::Conflict("record id already exists".to_string()));
        }
        records.insert(record.id, record.clone());
        log.push(audit.clone());
        Ok(())
    }

    async fn update_record_audited(
        &self,
        org_id: Uuid,
        record: &TenantRecord,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut records = lock(&self.records, "records")?;
        let mut log = lock(&self.audit, "audit")?;

        let slot = records
            .get_mut(&record.id)
            .filter(|r| r.organization_id == org_id && record.organization_id == org_id)
            .ok_or(StoreError::NotFound)?;
        self.check_audit_writable()?;
        *slot = record.clone();
        log.push(audit.clone());
        Ok(())
    }

    async fn locate_record(&self, id: Uuid) -> Result<Option<RecordLocation>, StoreError> {
        Ok(lock(&self.records, "records")?
            .get(&id)
            .map(RecordLocation::from))
    }

    async fn find_record_any_tenant(&self, id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        Ok(lock(&self.records, "records")?.get(&id).cloned())
    }

    async fn list_all_records(
        &self,
        org_id: Option<Uuid>,
        filter: &RecordFilter,
    ) -> Result<Vec<TenantRecord>, StoreError> {
        let mut rows: Vec<TenantRecord> = lock(&self.records, "records")?
            .values()
            .filter(|r| org_id.is_none_or(|org| r.organization_id == org))
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn next_sequence(&self, org_id: Uuid, scope: SequenceScope) -> Result<i64, StoreError> {
        let mut sequences = lock(&self.sequences, "sequences")?;
        let next = sequences.entry((org_id, scope)).or_insert(0);
        *next += 1;
        Ok(*next)
    }
}

#[async_trait]
impl CareStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        lock(&self.audit, "audit").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, AuditOutcome, AuditPartition, NewAuditEntry, OrgRole};
    use crate::services::membership::MembershipRejection;

    fn entry(org: Option<Uuid>) -> AuditLogEntry {
        NewAuditEntry::new(AuditAction::RecordRead, AuditOutcome::Success)
            .organization(org)
            .stamp()
    }

    #[tokio::test]
    async fn audit_query_respects_partitions() {
        let store = MemoryStore::new();
        let acme = Uuid::new_v4();
        let beta = Uuid::new_v4();
        store.append(&entry(Some(acme))).await.unwrap();
        store.append(&entry(Some(beta))).await.unwrap();
        store.append(&entry(None)).await.unwrap();

        let acme_only = store
            .query(&AuditFilter::partition(AuditPartition::Organization(acme)), 10)
            .await
            .unwrap();
        assert_eq!(acme_only.len(), 1);
        assert_eq!(acme_only[0].organization_id, Some(acme));

        let unscoped = store
            .query(&AuditFilter::partition(AuditPartition::Unscoped), 10)
            .await
            .unwrap();
        assert_eq!(unscoped.len(), 1);

        let all = store
            .query(&AuditFilter::partition(AuditPartition::All), 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn failed_audit_write_leaves_the_row_untouched() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let now = Utc::now();
        let record = TenantRecord {
            id: Uuid::new_v4(),
            kind: RecordKind::Client,
            organization_id: org,
            home_id: Some(Uuid::new_v4()),
            is_active: true,
            data: serde_json::json!({}),
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };

        store.fail_audit_writes(true);
        let result = store.insert_record_audited(&record, &entry(Some(org))).await;
        assert!(matches!(result, Err(StoreError::AuditWrite(_))));
        assert!(store.find_record_any_tenant(record.id).await.unwrap().is_none());
        assert!(store.audit_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_owner_removals_keep_one_owner() {
        let store = Arc::new(MemoryStore::new());
        let org = Uuid::new_v4();
        let a = OrganizationMembership::new(Uuid::new_v4(), org, OrgRole::Admin, true);
        let b = OrganizationMembership::new(Uuid::new_v4(), org, OrgRole::Admin, true);
        store.insert_membership(a.clone()).unwrap();
        store.insert_membership(b.clone()).unwrap();

        let tasks = [a.user_id, b.user_id].map(|user_id| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .apply_membership_change(
                        org,
                        user_id,
                        &MembershipChange::SetOwner {
                            user_id,
                            is_owner: false,
                        },
                        &entry(Some(org)),
                    )
                    .await
            })
        });

        let mut rejected = 0;
        for task in tasks {
            if let Err(StoreError::Rejected(_)) = task.await.unwrap() {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);

        let owners = store
            .list_memberships(org)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.is_active_owner())
            .count();
        assert_eq!(owners, 1);
    }

    #[tokio::test]
    async fn owner_promoted_after_the_policy_check_stays_protected() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let owner = OrganizationMembership::new(Uuid::new_v4(), org, OrgRole::Admin, true);
        let admin = OrganizationMembership::new(Uuid::new_v4(), org, OrgRole::Admin, false);
        let target = OrganizationMembership::new(Uuid::new_v4(), org, OrgRole::Admin, false);
        for m in [&owner, &admin, &target] {
            store.insert_membership(m.clone()).unwrap();
        }

        store
            .apply_membership_change(
                org,
                owner.user_id,
                &MembershipChange::SetOwner {
                    user_id: target.user_id,
                    is_owner: true,
                },
                &entry(Some(org)),
            )
            .await
            .unwrap();

        // The admin's request was authorized while the target was not an owner
        let result = store
            .apply_membership_change(
                org,
                admin.user_id,
                &MembershipChange::Deactivate {
                    user_id: target.user_id,
                },
                &entry(Some(org)),
            )
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Rejected(MembershipRejection::NotOwner))
        ));

        let row = store
            .find_membership(target.user_id, org)
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_active_owner());
        assert_eq!(store.audit_entries().unwrap().len(), 1);
    }
}

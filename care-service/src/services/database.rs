//! PostgreSQL store.
//!
//! Audited mutations run in one transaction with their audit insert; a
//! failed audit insert rolls the mutation back. Membership changes lock the
//! organization row (`SELECT ... FOR UPDATE`) before reading memberships.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{FromRow, QueryBuilder};
use std::collections::HashSet;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditLogEntry, AuditPartition, CaregiverHomeAssignment, GlobalRole, Organization,
    OrganizationMembership, OrganizationSummary, RecordFilter, RecordKind, RecordLocation,
    TenantRecord, User,
};
use crate::services::membership::{plan_membership_change, MembershipChange};
use crate::services::store::{
    AuditStore, CareStore, DirectoryStore, RecordStore, SequenceScope, StoreError,
};

const USER_COLUMNS: &str = "id, email, display_name, password_hash, global_roles, is_active, \
     failed_login_attempts, locked_until, created_at";
const MEMBERSHIP_COLUMNS: &str = "id, user_id, organization_id, role, is_owner, joined_at, is_active";
const RECORD_COLUMNS: &str =
    "id, kind, organization_id, home_id, is_active, data, created_by, created_at, updated_at";
const AUDIT_COLUMNS: &str = "id, occurred_at, organization_id, user_id, user_email, action, \
     resource_type, resource_id, outcome, ip_address, details, privileged";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: Option<String>,
    password_hash: String,
    global_roles: Vec<String>,
    is_active: bool,
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let global_roles = row
            .global_roles
            .iter()
            .map(|r| r.parse::<GlobalRole>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Corrupt)?;
        Ok(User {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            password_hash: row.password_hash,
            global_roles,
            is_active: row.is_active,
            failed_login_attempts: row.failed_login_attempts,
            locked_until: row.locked_until,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MembershipRow {
    id: Uuid,
    user_id: Uuid,
    organization_id: Uuid,
    role: String,
    is_owner: bool,
    joined_at: DateTime<Utc>,
    is_active: bool,
}

impl TryFrom<MembershipRow> for OrganizationMembership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(OrganizationMembership {
            id: row.id,
            user_id: row.user_id,
            organization_id: row.organization_id,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            is_owner: row.is_owner,
            joined_at: row.joined_at,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    organization_id: Uuid,
    name: String,
    role: String,
    is_owner: bool,
}

#[derive(FromRow)]
struct AssignmentRow {
    id: Uuid,
    user_id: Uuid,
    home_id: Uuid,
    organization_id: Uuid,
    assigned_at: DateTime<Utc>,
    assigned_by: Option<Uuid>,
    is_active: bool,
}

impl From<AssignmentRow> for CaregiverHomeAssignment {
    fn from(row: AssignmentRow) -> Self {
        CaregiverHomeAssignment {
            id: row.id,
            user_id: row.user_id,
            home_id: row.home_id,
            organization_id: row.organization_id,
            assigned_at: row.assigned_at,
            assigned_by: row.assigned_by,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct RecordRow {
    id: Uuid,
    kind: String,
    organization_id: Uuid,
    home_id: Option<Uuid>,
    is_active: bool,
    data: serde_json::Value,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for TenantRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(TenantRecord {
            id: row.id,
            kind: row.kind.parse().map_err(StoreError::Corrupt)?,
            organization_id: row.organization_id,
            home_id: row.home_id,
            is_active: row.is_active,
            data: row.data,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    occurred_at: DateTime<Utc>,
    organization_id: Option<Uuid>,
    user_id: Option<Uuid>,
    user_email: Option<String>,
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    outcome: String,
    ip_address: Option<String>,
    details: Option<String>,
    privileged: bool,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditLogEntry {
            id: row.id,
            timestamp: row.occurred_at,
            organization_id: row.organization_id,
            user_id: row.user_id,
            user_email: row.user_email,
            action: row.action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            outcome: row.outcome.parse().map_err(StoreError::Corrupt)?,
            ip_address: row.ip_address,
            details: row.details,
            privileged: row.privileged,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn sequence_key(scope: SequenceScope) -> String {
    match scope {
        SequenceScope::Homes => "homes".to_string(),
        SequenceScope::Incidents { home_id } => format!("incidents:{}", home_id),
    }
}

async fn insert_audit<'e, E>(executor: E, entry: &AuditLogEntry) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_log_entries (id, occurred_at, organization_id, user_id, user_email, action,
            resource_type, resource_id, outcome, ip_address, details, privileged)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(entry.id)
    .bind(entry.timestamp)
    .bind(entry.organization_id)
    .bind(entry.user_id)
    .bind(&entry.user_email)
    .bind(&entry.action)
    .bind(&entry.resource_type)
    .bind(&entry.resource_id)
    .bind(entry.outcome.as_str())
    .bind(&entry.ip_address)
    .bind(&entry.details)
    .bind(entry.privileged)
    .execute(executor)
    .await
    .map_err(|e| StoreError::AuditWrite(e.to_string()))?;
    Ok(())
}

fn push_record_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &RecordFilter) {
    if let Some(kind) = filter.kind {
        builder.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(home_id) = filter.home_id {
        builder.push(" AND home_id = ").push_bind(home_id);
    }
    if !filter.include_inactive {
        builder.push(" AND is_active");
    }
}

/// PostgreSQL-backed `CareStore`.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AuditStore for Database {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        insert_audit(&self.pool, entry).await
    }

    #[instrument(skip_all)]
    async fn query(
        &self,
        filter: &AuditFilter,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM audit_log_entries WHERE TRUE",
            AUDIT_COLUMNS
        ));
        match filter.partition {
            AuditPartition::Organization(org) => {
                builder.push(" AND organization_id = ").push_bind(org);
            }
            AuditPartition::Unscoped => {
                builder.push(" AND organization_id IS NULL");
            }
            AuditPartition::All => {}
        }
        if let Some(from) = filter.from {
            builder.push(" AND occurred_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND occurred_at < ").push_bind(to);
        }
        if let Some(action) = &filter.action {
            builder.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(outcome) = filter.outcome {
            builder.push(" AND outcome = ").push_bind(outcome.as_str());
        }
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(cursor) = filter.cursor {
            builder
                .push(" AND (occurred_at, id) < (")
                .push_bind(cursor.timestamp)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }
        builder
            .push(" ORDER BY occurred_at DESC, id DESC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }
}

#[async_trait]
impl DirectoryStore for Database {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn insert_user_audited(
        &self,
        user: &User,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let roles: Vec<&str> = user.global_roles.iter().map(|r| r.as_str()).collect();
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, password_hash, global_roles, is_active,
                failed_login_attempts, locked_until, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(&roles)
        .bind(user.is_active)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                failed_login_attempts = CASE WHEN failed_login_attempts + 1 >= $2 THEN 0
                    ELSE failed_login_attempts + 1 END,
                locked_until = CASE WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE locked_until END
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(threshold)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        User::try_from(row)
    }

    async fn reset_login_failures(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, is_active, created_at, updated_at FROM organizations WHERE id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Organization::from))
    }

    #[instrument(skip_all, fields(organization_id = %org.id))]
    async fn create_organization_audited(
        &self,
        org: &Organization,
        owner: &OrganizationMembership,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(org.is_active)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO organization_memberships (id, user_id, organization_id, role, is_owner, joined_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(owner.id)
        .bind(owner.user_id)
        .bind(owner.organization_id)
        .bind(owner.role.as_str())
        .bind(owner.is_owner)
        .bind(owner.joined_at)
        .bind(owner.is_active)
        .execute(&mut *tx)
        .await?;

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_user_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrganizationSummary>, StoreError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT o.id AS organization_id, o.name, m.role, m.is_owner
            FROM organization_memberships m
            JOIN organizations o ON o.id = m.organization_id
            WHERE m.user_id = $1 AND m.is_active AND o.is_active
            ORDER BY o.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrganizationSummary {
                    organization_id: row.organization_id,
                    name: row.name,
                    role: row.role.parse().map_err(StoreError::Corrupt)?,
                    is_owner: row.is_owner,
                })
            })
            .collect()
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<OrganizationMembership>, StoreError> {
        sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {} FROM organization_memberships WHERE user_id = $1 AND organization_id = $2",
            MEMBERSHIP_COLUMNS
        ))
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?
        .map(OrganizationMembership::try_from)
        .transpose()
    }

    async fn list_memberships(
        &self,
        org_id: Uuid,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {} FROM organization_memberships WHERE organization_id = $1 ORDER BY joined_at",
            MEMBERSHIP_COLUMNS
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    #[instrument(skip_all, fields(organization_id = %org_id))]
    async fn apply_membership_change(
        &self,
        org_id: Uuid,
        actor_user_id: Uuid,
        change: &MembershipChange,
        audit: &AuditLogEntry,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM organizations WHERE id = $1 FOR UPDATE")
            .bind(org_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        let rows = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {} FROM organization_memberships WHERE organization_id = $1",
            MEMBERSHIP_COLUMNS
        ))
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;
        let current: Vec<OrganizationMembership> = convert_all(rows)?;

        let writes = plan_membership_change(org_id, actor_user_id, &current, change, Utc::now())?;

        for row in &writes {
            sqlx::query(
                r#"
                INSERT INTO organization_memberships (id, user_id, organization_id, role, is_owner, joined_at, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    role = EXCLUDED.role,
                    is_owner = EXCLUDED.is_owner,
                    joined_at = EXCLUDED.joined_at,
                    is_active = EXCLUDED.is_active
                "#,
            )
            .bind(row.id)
            .bind(row.user_id)
            .bind(row.organization_id)
            .bind(row.role.as_str())
            .bind(row.is_owner)
            .bind(row.joined_at)
            .bind(row.is_active)
            .execute(&mut *tx)
            .await?;
        }

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(writes)
    }

    async fn active_home_ids(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<HashSet<Uuid>, StoreError> {
        let homes = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT home_id FROM caregiver_home_assignments
            WHERE user_id = $1 AND organization_id = $2 AND is_active
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(homes.into_iter().collect())
    }

    async fn upsert_assignment_audited(
        &self,
        assignment: &CaregiverHomeAssignment,
        audit: &AuditLogEntry,
    ) -> Result<CaregiverHomeAssignment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            INSERT INTO caregiver_home_assignments (id, user_id, home_id, organization_id, assigned_at, assigned_by, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            ON CONFLICT (user_id, home_id) DO UPDATE SET
                is_active = TRUE,
                assigned_at = EXCLUDED.assigned_at,
                assigned_by = EXCLUDED.assigned_by
            RETURNING id, user_id, home_id, organization_id, assigned_at, assigned_by, is_active
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.user_id)
        .bind(assignment.home_id)
        .bind(assignment.organization_id)
        .bind(assignment.assigned_at)
        .bind(assignment.assigned_by)
        .fetch_one(&mut *tx)
        .await?;

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn deactivate_assignment_audited(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        home_id: Uuid,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE caregiver_home_assignments SET is_active = FALSE
            WHERE organization_id = $1 AND user_id = $2 AND home_id = $3 AND is_active
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .bind(home_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn find_record(
        &self,
        org_id: Uuid,
        kind: RecordKind,
        id: Uuid,
    ) -> Result<Option<TenantRecord>, StoreError> {
        sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM tenant_records WHERE id = $1 AND organization_id = $2 AND kind = $3",
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(org_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(TenantRecord::try_from)
        .transpose()
    }

    async fn list_records(
        &self,
        org_id: Uuid,
        filter: &RecordFilter,
    ) -> Result<Vec<TenantRecord>, StoreError> {
        self.list_all_records(Some(org_id), filter).await
    }

    #[instrument(skip_all, fields(record_id = %record.id, kind = record.kind.as_str()))]
    async fn insert_record_audited(
        &self,
        record: &TenantRecord,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tenant_records (id, kind, organization_id, home_id, is_active, data, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(record.organization_id)
        .bind(record.home_id)
        .bind(record.is_active)
        .bind(&record.data)
        .bind(record.created_by)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all, fields(record_id = %record.id, organization_id = %org_id))]
    async fn update_record_audited(
        &self,
        org_id: Uuid,
        record: &TenantRecord,
        audit: &AuditLogEntry,
    ) -> Result<(), StoreError> {
        if record.organization_id != org_id {
            return Err(StoreError::NotFound);
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE tenant_records
            SET home_id = $3, is_active = $4, data = $5, updated_at = $6
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(record.id)
        .bind(org_id)
        .bind(record.home_id)
        .bind(record.is_active)
        .bind(&record.data)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn locate_record(&self, id: Uuid) -> Result<Option<RecordLocation>, StoreError> {
        Ok(self
            .find_record_any_tenant(id)
            .await?
            .as_ref()
            .map(RecordLocation::from))
    }

    async fn find_record_any_tenant(&self, id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM tenant_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(TenantRecord::try_from)
        .transpose()
    }

    async fn list_all_records(
        &self,
        org_id: Option<Uuid>,
        filter: &RecordFilter,
    ) -> Result<Vec<TenantRecord>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM tenant_records WHERE TRUE",
            RECORD_COLUMNS
        ));
        if let Some(org_id) = org_id {
            builder.push(" AND organization_id = ").push_bind(org_id);
        }
        push_record_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at, id");

        let rows = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn next_sequence(&self, org_id: Uuid, scope: SequenceScope) -> Result<i64, StoreError> {
        let value = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO record_sequences (organization_id, scope_key, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (organization_id, scope_key)
            DO UPDATE SET last_value = record_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(org_id)
        .bind(sequence_key(scope))
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }
}

#[async_trait]
impl CareStore for Database {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StoreError::Unavailable(e.to_string())
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_keys_are_distinct_per_home() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(sequence_key(SequenceScope::Homes), "homes");
        assert_ne!(
            sequence_key(SequenceScope::Incidents { home_id: a }),
            sequence_key(SequenceScope::Incidents { home_id: b })
        );
    }

    #[test]
    fn corrupt_role_is_reported() {
        let row = MembershipRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role: "Owner".to_string(),
            is_owner: true,
            joined_at: Utc::now(),
            is_active: true,
        };
        assert!(matches!(
            OrganizationMembership::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL
    async fn audit_rows_cannot_be_updated() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/care_test".to_string());
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let db = Database::new(pool);

        let entry = crate::models::NewAuditEntry::new(
            crate::models::AuditAction::AuditQuery,
            crate::models::AuditOutcome::Success,
        )
        .stamp();
        db.append(&entry).await.unwrap();

        let update = sqlx::query("UPDATE audit_log_entries SET details = 'x' WHERE id = $1")
            .bind(entry.id)
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM audit_log_entries WHERE id = $1")
            .bind(entry.id)
            .execute(db.pool())
            .await;
        assert!(delete.is_err());
    }
}

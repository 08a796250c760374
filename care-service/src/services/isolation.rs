//! Row-level isolation filter.
//!
//! `TenantRecords` is the only path to tenant-scoped rows. Every store call
//! it makes carries the caller's organization id; reads outside the tenant
//! come back as not found and writes naming another tenant are rejected as
//! `CrossTenantViolation`. The unfiltered store reads are reachable only
//! through the Sysadmin bypass methods at the bottom of this file, each of
//! which records one privileged audit entry.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditOutcome, NewAuditEntry, NewRecord, RecordChanges, RecordFilter, RecordKind,
    RecordLocation, TenantRecord,
};
use crate::services::audit::AuditWriter;
use crate::services::context::{Principal, TenantContext};
use crate::services::error::ServiceError;
use crate::services::home_scope::{HomeScope, HomeScopeService};
use crate::services::incident_number::{self, IncidentType};
use crate::services::policy::{self, Action, Decision, Resource};
use crate::services::store::{CareStore, SequenceScope, StoreError};

/// Payload keys assigned by the service. Client-supplied values are dropped.
pub const HOME_SEQUENCE_KEY: &str = "home_sequence";
pub const INCIDENT_NUMBER_KEY: &str = "incident_number";
const INCIDENT_TYPE_KEY: &str = "incident_type";

#[derive(Clone)]
pub struct TenantRecords {
    store: Arc<dyn CareStore>,
    audit: AuditWriter,
    home_scope: HomeScopeService,
}

fn record_entry(
    ctx: &TenantContext,
    action: AuditAction,
    outcome: AuditOutcome,
    kind: RecordKind,
    id: Option<Uuid>,
    ip: Option<&str>,
) -> NewAuditEntry {
    NewAuditEntry::new(action, outcome)
        .organization(Some(ctx.organization_id))
        .actor(Some(ctx.user_id), Some(&ctx.email))
        .resource(kind.as_str(), id.map(|id| id.to_string()))
        .ip(ip)
}

fn payload_object(data: Value) -> Result<Map<String, Value>, ServiceError> {
    match data {
        Value::Object(mut map) => {
            map.remove(HOME_SEQUENCE_KEY);
            map.remove(INCIDENT_NUMBER_KEY);
            Ok(map)
        }
        _ => Err(ServiceError::Validation(
            "record data must be a JSON object".to_string(),
        )),
    }
}

impl TenantRecords {
    pub fn new(store: Arc<dyn CareStore>, audit: AuditWriter, home_scope: HomeScopeService) -> Self {
        Self {
            store,
            audit,
            home_scope,
        }
    }

    /// Records of `kind` in the caller's organization, narrowed to the
    /// caller's home scope. A home filter outside the scope yields nothing
    /// and is audited as a denial.
    pub async fn query(
        &self,
        ctx: &TenantContext,
        kind: RecordKind,
        filter: RecordFilter,
        ip: Option<&str>,
    ) -> Result<Vec<TenantRecord>, ServiceError> {
        let entry = |outcome| record_entry(ctx, AuditAction::RecordList, outcome, kind, None, ip);

        if let Decision::Deny(reason) = policy::authorize(ctx, Action::Read, Resource::Record(kind)) {
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Denied).details(reason), ServiceError::Forbidden)
                .await);
        }

        let scope = self.home_scope.scope_for(ctx).await?;
        let filter = RecordFilter {
            kind: Some(kind),
            ..filter
        };

        if let Some(home) = filter.home_id.filter(|h| !scope.authorize(Some(*h))) {
            self.audit
                .append(
                    entry(AuditOutcome::Denied)
                        .details(format!("home filter {} outside caller's scope", home)),
                )
                .await?;
            return Ok(Vec::new());
        }

        let mut records = self.store.list_records(ctx.organization_id, &filter).await?;
        records.retain(|r| r.organization_id == ctx.organization_id);
        records.retain(|r| scope.authorize_record(r));

        self.audit
            .append(entry(AuditOutcome::Success).details(format!("returned={}", records.len())))
            .await?;
        Ok(records)
    }

    pub async fn get(
        &self,
        ctx: &TenantContext,
        kind: RecordKind,
        id: Uuid,
        ip: Option<&str>,
    ) -> Result<TenantRecord, ServiceError> {
        let entry =
            |outcome| record_entry(ctx, AuditAction::RecordRead, outcome, kind, Some(id), ip);

        if let Decision::Deny(reason) = policy::authorize(ctx, Action::Read, Resource::Record(kind)) {
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Denied).details(reason), ServiceError::Forbidden)
                .await);
        }

        let Some(record) = self.store.find_record(ctx.organization_id, kind, id).await? else {
            return Err(self.reject_missing(ctx, id, entry).await);
        };

        let scope = self.home_scope.scope_for(ctx).await?;
        if !scope.authorize_record(&record) {
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Denied).details("record outside caller's home scope"),
                    ServiceError::InsufficientHomeScope,
                )
                .await);
        }

        self.audit.append(entry(AuditOutcome::Success)).await?;
        Ok(record)
    }

    pub async fn create(
        &self,
        ctx: &TenantContext,
        new: NewRecord,
        ip: Option<&str>,
    ) -> Result<TenantRecord, ServiceError> {
        let kind = new.kind;
        let id = Uuid::new_v4();
        let entry =
            |outcome| record_entry(ctx, AuditAction::RecordCreate, outcome, kind, Some(id), ip);

        if new.organization_id != ctx.organization_id {
            tracing::warn!(
                organization_id = %ctx.organization_id,
                user_id = %ctx.user_id,
                "Cross-tenant insert rejected"
            );
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Denied)
                        .details(format!("insert named organization {}", new.organization_id)),
                    ServiceError::CrossTenantViolation,
                )
                .await);
        }

        if let Decision::Deny(reason) =
            policy::authorize(ctx, Action::Create, Resource::Record(kind))
        {
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Denied).details(reason), ServiceError::Forbidden)
                .await);
        }

        let mut data = match payload_object(new.data) {
            Ok(data) => data,
            Err(err) => {
                return Err(self
                    .audit
                    .reject(entry(AuditOutcome::Failure).details(err.to_string()), err)
                    .await)
            }
        };

        let home_id = if kind == RecordKind::Home {
            Some(id)
        } else {
            let scope = self.home_scope.scope_for(ctx).await?;
            self.check_home_reference(ctx, kind, new.home_id, &scope, entry)
                .await?;
            new.home_id
        };

        match kind {
            RecordKind::Home => {
                let sequence = self
                    .store
                    .next_sequence(ctx.organization_id, SequenceScope::Homes)
                    .await?;
                data.insert(HOME_SEQUENCE_KEY.to_string(), Value::from(sequence));
            }
            RecordKind::Incident => {
                let number = match self.incident_number(ctx, home_id, &data).await {
                    Ok(number) => number,
                    Err(err @ ServiceError::Validation(_)) => {
                        return Err(self
                            .audit
                            .reject(entry(AuditOutcome::Failure).details(err.to_string()), err)
                            .await)
                    }
                    Err(err) => return Err(err),
                };
                data.insert(INCIDENT_NUMBER_KEY.to_string(), Value::from(number));
            }
            _ => {}
        }

        let now = Utc::now();
        let record = TenantRecord {
            id,
            kind,
            organization_id: ctx.organization_id,
            home_id,
            is_active: true,
            data: Value::Object(data),
            created_by: ctx.user_id,
            created_at: now,
            updated_at: now,
        };

        let stamped = entry(AuditOutcome::Success).stamp();
        self.store.insert_record_audited(&record, &stamped).await?;
        AuditWriter::committed(&stamped);

        tracing::info!(
            organization_id = %ctx.organization_id,
            record_id = %record.id,
            kind = kind.as_str(),
            "Record created"
        );
        Ok(record)
    }

    pub async fn update(
        &self,
        ctx: &TenantContext,
        kind: RecordKind,
        id: Uuid,
        changes: RecordChanges,
        ip: Option<&str>,
    ) -> Result<TenantRecord, ServiceError> {
        let entry =
            |outcome| record_entry(ctx, AuditAction::RecordUpdate, outcome, kind, Some(id), ip);

        if let Some(org) = changes.organization_id.filter(|org| *org != ctx.organization_id) {
            tracing::warn!(
                organization_id = %ctx.organization_id,
                user_id = %ctx.user_id,
                "Cross-tenant update rejected"
            );
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Denied).details(format!("update named organization {}", org)),
                    ServiceError::CrossTenantViolation,
                )
                .await);
        }

        if let Decision::Deny(reason) =
            policy::authorize(ctx, Action::Update, Resource::Record(kind))
        {
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Denied).details(reason), ServiceError::Forbidden)
                .await);
        }

        let Some(current) = self.store.find_record(ctx.organization_id, kind, id).await? else {
            return Err(self.reject_missing(ctx, id, entry).await);
        };

        let scope = self.home_scope.scope_for(ctx).await?;
        if !scope.authorize_record(&current) {
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Denied).details("record outside caller's home scope"),
                    ServiceError::InsufficientHomeScope,
                )
                .await);
        }

        let mut updated = current.clone();
        if kind != RecordKind::Home {
            if let Some(home) = changes.home_id.filter(|h| Some(*h) != current.home_id) {
                self.check_home_reference(ctx, kind, Some(home), &scope, entry)
                    .await?;
                updated.home_id = Some(home);
            }
        }

        if let Some(data) = changes.data {
            let mut data = match payload_object(data) {
                Ok(data) => data,
                Err(err) => {
                    return Err(self
                        .audit
                        .reject(entry(AuditOutcome::Failure).details(err.to_string()), err)
                        .await)
                }
            };
            for key in [HOME_SEQUENCE_KEY, INCIDENT_NUMBER_KEY] {
                if let Some(value) = current.data.get(key) {
                    data.insert(key.to_string(), value.clone());
                }
            }
            updated.data = Value::Object(data);
        }
        updated.updated_at = Utc::now();

        let stamped = entry(AuditOutcome::Success).stamp();
        self.store
            .update_record_audited(ctx.organization_id, &updated, &stamped)
            .await?;
        AuditWriter::committed(&stamped);
        Ok(updated)
    }

    /// Soft delete. Records are never removed.
    pub async fn deactivate(
        &self,
        ctx: &TenantContext,
        kind: RecordKind,
        id: Uuid,
        ip: Option<&str>,
    ) -> Result<TenantRecord, ServiceError> {
        let entry =
            |outcome| record_entry(ctx, AuditAction::RecordDeactivate, outcome, kind, Some(id), ip);

        if let Decision::Deny(reason) =
            policy::authorize(ctx, Action::Deactivate, Resource::Record(kind))
        {
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Denied).details(reason), ServiceError::Forbidden)
                .await);
        }

        let Some(current) = self.store.find_record(ctx.organization_id, kind, id).await? else {
            return Err(self.reject_missing(ctx, id, entry).await);
        };

        let updated = TenantRecord {
            is_active: false,
            updated_at: Utc::now(),
            ..current
        };
        let stamped = entry(AuditOutcome::Success).stamp();
        self.store
            .update_record_audited(ctx.organization_id, &updated, &stamped)
            .await?;
        AuditWriter::committed(&stamped);
        Ok(updated)
    }

    // Bypass path. Sysadmin only; one privileged entry per invocation.

    /// Records across every organization, or one named organization.
    pub async fn query_all_tenants(
        &self,
        principal: &Principal,
        organization_id: Option<Uuid>,
        filter: RecordFilter,
        ip: Option<&str>,
    ) -> Result<Vec<TenantRecord>, ServiceError> {
        let entry = NewAuditEntry::new(AuditAction::BypassQuery, AuditOutcome::Success)
            .organization(organization_id)
            .actor(Some(principal.user_id), Some(&principal.email))
            .resource(
                filter.kind.map(|k| k.as_str()).unwrap_or("tenant_record"),
                organization_id.map(|org| org.to_string()),
            )
            .ip(ip);
        self.authorize_bypass(principal, AuditAction::BypassQuery, ip)
            .await?;

        let records = self.store.list_all_records(organization_id, &filter).await?;
        let organizations = records
            .iter()
            .map(|r| r.organization_id)
            .collect::<std::collections::HashSet<_>>()
            .len();

        self.audit
            .append(entry.privileged().details(format!(
                "returned={} organizations={}",
                records.len(),
                organizations
            )))
            .await?;

        tracing::warn!(
            user_id = %principal.user_id,
            returned = records.len(),
            "Privileged cross-tenant query"
        );
        Ok(records)
    }

    pub async fn get_ignoring_filter(
        &self,
        principal: &Principal,
        kind: RecordKind,
        id: Uuid,
        ip: Option<&str>,
    ) -> Result<TenantRecord, ServiceError> {
        let entry = |outcome, org| {
            NewAuditEntry::new(AuditAction::BypassGet, outcome)
                .organization(org)
                .actor(Some(principal.user_id), Some(&principal.email))
                .resource(kind.as_str(), Some(id.to_string()))
                .ip(ip)
                .privileged()
        };
        self.authorize_bypass(principal, AuditAction::BypassGet, ip)
            .await?;

        let record = self
            .store
            .find_record_any_tenant(id)
            .await?
            .filter(|r| r.kind == kind);
        let Some(record) = record else {
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Failure, None).details("record does not exist"),
                    ServiceError::NotFound,
                )
                .await);
        };

        self.audit
            .append(entry(AuditOutcome::Success, Some(record.organization_id)))
            .await?;
        tracing::warn!(
            user_id = %principal.user_id,
            organization_id = %record.organization_id,
            record_id = %id,
            "Privileged cross-tenant read"
        );
        Ok(record)
    }

    /// Explicit existence check: where a record lives, without its payload.
    pub async fn locate(
        &self,
        principal: &Principal,
        kind: RecordKind,
        id: Uuid,
        ip: Option<&str>,
    ) -> Result<RecordLocation, ServiceError> {
        let entry = |outcome, org| {
            NewAuditEntry::new(AuditAction::BypassLocate, outcome)
                .organization(org)
                .actor(Some(principal.user_id), Some(&principal.email))
                .resource(kind.as_str(), Some(id.to_string()))
                .ip(ip)
                .privileged()
        };
        self.authorize_bypass(principal, AuditAction::BypassLocate, ip)
            .await?;

        match self.store.locate_record(id).await?.filter(|l| l.kind == kind) {
            Some(location) => {
                self.audit
                    .append(entry(AuditOutcome::Success, Some(location.organization_id)))
                    .await?;
                Ok(location)
            }
            None => Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Failure, None).details("record does not exist"),
                    ServiceError::NotFound,
                )
                .await),
        }
    }

    async fn authorize_bypass(
        &self,
        principal: &Principal,
        action: AuditAction,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        if let Decision::Deny(reason) = policy::authorize_bypass(principal) {
            let denied = NewAuditEntry::new(action, AuditOutcome::Denied)
                .organization(principal.organization_id())
                .actor(Some(principal.user_id), Some(&principal.email))
                .ip(ip)
                .details(reason);
            return Err(self.audit.reject(denied, ServiceError::Forbidden).await);
        }
        Ok(())
    }

    /// Audit a miss on an id-addressed operation. A row that exists in another
    /// organization is a cross-tenant attempt; the caller still sees not found.
    async fn reject_missing<F>(&self, ctx: &TenantContext, id: Uuid, entry: F) -> ServiceError
    where
        F: Fn(AuditOutcome) -> NewAuditEntry,
    {
        let foreign = match self.store.locate_record(id).await {
            Ok(location) => location.is_some_and(|l| l.organization_id != ctx.organization_id),
            Err(e) => return e.into(),
        };

        if foreign {
            tracing::warn!(
                organization_id = %ctx.organization_id,
                user_id = %ctx.user_id,
                record_id = %id,
                "Cross-tenant access rejected"
            );
            self.audit
                .reject(
                    entry(AuditOutcome::Denied).details("record belongs to another organization"),
                    ServiceError::CrossTenantViolation,
                )
                .await
        } else {
            self.audit
                .reject(
                    entry(AuditOutcome::Failure).details("record not found"),
                    ServiceError::NotFound,
                )
                .await
        }
    }

    /// A non-home record must point at an active home of the caller's
    /// organization that is inside the caller's scope.
    async fn check_home_reference<F>(
        &self,
        ctx: &TenantContext,
        kind: RecordKind,
        home_id: Option<Uuid>,
        scope: &HomeScope,
        entry: F,
    ) -> Result<(), ServiceError>
    where
        F: Fn(AuditOutcome) -> NewAuditEntry,
    {
        let Some(home) = home_id else {
            if kind.requires_home() {
                let err = ServiceError::Validation(format!("{} records require a home_id", kind));
                return Err(self
                    .audit
                    .reject(entry(AuditOutcome::Failure).details(err.to_string()), err)
                    .await);
            }
            if !scope.authorize(None) {
                return Err(self
                    .audit
                    .reject(
                        entry(AuditOutcome::Denied).details("organization-wide record outside scope"),
                        ServiceError::InsufficientHomeScope,
                    )
                    .await);
            }
            return Ok(());
        };

        if !scope.authorize(Some(home)) {
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Denied).details(format!("home {} outside caller's scope", home)),
                    ServiceError::InsufficientHomeScope,
                )
                .await);
        }

        let exists = self
            .store
            .find_record(ctx.organization_id, RecordKind::Home, home)
            .await?
            .is_some_and(|h| h.is_active);
        if !exists {
            let err = ServiceError::Validation("home_id does not reference an active home".into());
            return Err(self
                .audit
                .reject(entry(AuditOutcome::Failure).details(err.to_string()), err)
                .await);
        }
        Ok(())
    }

    async fn incident_number(
        &self,
        ctx: &TenantContext,
        home_id: Option<Uuid>,
        data: &Map<String, Value>,
    ) -> Result<String, ServiceError> {
        let incident_type = match data.get(INCIDENT_TYPE_KEY) {
            None | Some(Value::Null) => IncidentType::Other,
            Some(Value::String(s)) => s
                .parse::<IncidentType>()
                .map_err(|e| ServiceError::Validation(e.to_string()))?,
            Some(_) => {
                return Err(ServiceError::Validation(
                    "incident_type must be a string".to_string(),
                ))
            }
        };

        let home_id = home_id
            .ok_or_else(|| ServiceError::Validation("incidents require a home_id".to_string()))?;
        let home_sequence = self
            .store
            .find_record(ctx.organization_id, RecordKind::Home, home_id)
            .await?
            .and_then(|home| home.data.get(HOME_SEQUENCE_KEY).and_then(Value::as_i64))
            .ok_or_else(|| {
                ServiceError::Store(StoreError::Corrupt(format!(
                    "home {} has no sequence number",
                    home_id
                )))
            })?;

        let incident_sequence = self
            .store
            .next_sequence(ctx.organization_id, SequenceScope::Incidents { home_id })
            .await?;

        incident_number::generate(incident_type, home_sequence, incident_sequence)
            .map_err(|e| ServiceError::Validation(e.to_string()))
    }
}

//! Audit log writer and query interface.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditCursor, AuditFilter, AuditLogEntry, AuditOutcome, AuditPartition,
    NewAuditEntry,
};
use crate::services::context::Principal;
use crate::services::error::ServiceError;
use crate::services::policy::{self, Action, Resource};
use crate::services::store::CareStore;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Clone)]
pub struct AuditWriter {
    store: Arc<dyn CareStore>,
}

/// Query parameters. Admins are always confined to their own organization.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub organization_id: Option<Uuid>,
    /// Sysadmin only: read the pre-authentication partition.
    pub unscoped: bool,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub user_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    pub continuation: Option<String>,
}

pub fn encode_continuation(cursor: &AuditCursor) -> Result<String, ServiceError> {
    let json = serde_json::to_vec(cursor).map_err(|e| ServiceError::Internal(e.into()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_continuation(token: &str) -> Result<AuditCursor, ServiceError> {
    URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| ServiceError::Validation("invalid continuation token".to_string()))
}

impl AuditWriter {
    pub fn new(store: Arc<dyn CareStore>) -> Self {
        Self { store }
    }

    /// Stamp and durably append one entry. Failure is reported to the caller,
    /// who must fail the surrounding operation.
    pub async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, ServiceError> {
        let entry = entry.stamp();
        self.store.append(&entry).await.map_err(|e| {
            tracing::error!(
                error = %e,
                action = %entry.action,
                outcome = entry.outcome.as_str(),
                "Failed to append audit entry"
            );
            ServiceError::AuditWriteFailure(e.to_string())
        })?;
        Self::committed(&entry);
        Ok(entry)
    }

    /// Append a rejection entry and hand back the error that caused it. If the
    /// entry cannot be written the audit failure wins.
    pub async fn reject(&self, entry: NewAuditEntry, err: ServiceError) -> ServiceError {
        if entry.outcome() == AuditOutcome::Denied {
            tracing::warn!(action = entry.action().as_str(), reason = %err, "Access denied");
        }
        match self.append(entry).await {
            Ok(_) => err,
            Err(audit_err) => audit_err,
        }
    }

    /// Bookkeeping for entries committed together with a mutation.
    pub fn committed(entry: &AuditLogEntry) {
        counter!("audit_entries_total", "outcome" => entry.outcome.as_str()).increment(1);
    }

    /// Read-only audit query. The query itself is recorded.
    pub async fn query(
        &self,
        principal: &Principal,
        query: AuditQuery,
        ip: Option<&str>,
    ) -> Result<AuditPage, ServiceError> {
        let partition = self.authorize_query(principal, &query, ip).await?;

        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let cursor = query
            .continuation
            .as_deref()
            .map(decode_continuation)
            .transpose()?;

        let filter = AuditFilter {
            partition,
            from: query.from,
            to: query.to,
            action: query.action.clone(),
            outcome: query.outcome,
            user_id: query.user_id,
            cursor,
        };

        let mut entries = self.store.query(&filter, limit + 1).await?;
        let continuation = if entries.len() > limit {
            entries.truncate(limit);
            entries
                .last()
                .map(|last| encode_continuation(&AuditCursor::after(last)))
                .transpose()?
        } else {
            None
        };

        let privileged = principal.is_sysadmin()
            && !matches!(partition, AuditPartition::Organization(id) if Some(id) == principal.organization_id());
        let mut entry = NewAuditEntry::new(AuditAction::AuditQuery, AuditOutcome::Success)
            .organization(principal.organization_id())
            .actor(Some(principal.user_id), Some(&principal.email))
            .resource("audit_log", partition_label(partition))
            .ip(ip)
            .details(format!("returned={}", entries.len()));
        if privileged {
            entry = entry.privileged();
        }
        self.append(entry).await?;

        Ok(AuditPage {
            entries,
            continuation,
        })
    }

    async fn authorize_query(
        &self,
        principal: &Principal,
        query: &AuditQuery,
        ip: Option<&str>,
    ) -> Result<AuditPartition, ServiceError> {
        if principal.is_sysadmin() {
            return Ok(match (query.organization_id, query.unscoped) {
                (Some(org), _) => AuditPartition::Organization(org),
                (None, true) => AuditPartition::Unscoped,
                (None, false) => AuditPartition::All,
            });
        }

        let ctx = principal.tenant()?;
        let denied = || {
            NewAuditEntry::new(AuditAction::AuditQuery, AuditOutcome::Denied)
                .organization(Some(ctx.organization_id))
                .actor(Some(ctx.user_id), Some(&ctx.email))
                .resource("audit_log", None)
                .ip(ip)
        };

        if let policy::Decision::Deny(reason) =
            policy::authorize(ctx, Action::QueryAudit, Resource::AuditLog)
        {
            return Err(self.reject(denied().details(reason), ServiceError::Forbidden).await);
        }

        let foreign_org = query
            .organization_id
            .is_some_and(|org| org != ctx.organization_id);
        if foreign_org || query.unscoped {
            return Err(self
                .reject(
                    denied().details("audit query outside own organization"),
                    ServiceError::Forbidden,
                )
                .await);
        }

        Ok(AuditPartition::Organization(ctx.organization_id))
    }
}

fn partition_label(partition: AuditPartition) -> Option<String> {
    Some(match partition {
        AuditPartition::Organization(id) => id.to_string(),
        AuditPartition::Unscoped => "unscoped".to_string(),
        AuditPartition::All => "all".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_tokens_round_trip() {
        let cursor = AuditCursor {
            timestamp: Utc::now(),
            id: Uuid::new_v4(),
        };
        let token = encode_continuation(&cursor).unwrap();
        assert_eq!(decode_continuation(&token).unwrap(), cursor);
    }

    #[test]
    fn tampered_continuation_is_a_validation_error() {
        assert!(matches!(
            decode_continuation("%%%"),
            Err(ServiceError::Validation(_))
        ));
    }
}

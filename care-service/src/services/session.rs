//! Authentication and session issuing.
//!
//! Login moves through credential check, membership resolution, and then one
//! of: a session token (single membership, or a Sysadmin with none), an
//! organization-selection handle (several memberships), or `OrphanUser`.
//! Tokens are never modified once issued; switching organization issues a
//! fresh one.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditOutcome, NewAuditEntry, OrgRole, OrganizationSummary, User,
};
use crate::services::audit::AuditWriter;
use crate::services::context::{resolve_selection_handle, Principal};
use crate::services::error::ServiceError;
use crate::services::jwt::{JwtService, SessionClaims, TokenUse};
use crate::services::store::CareStore;
use crate::utils::password::{verify_against_dummy, verify_password, Password};

#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_role: Option<OrgRole>,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    TokenIssued(SessionToken),
    OrganizationSelectionRequired {
        selection_token: String,
        expires_in: i64,
        organizations: Vec<OrganizationSummary>,
    },
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn CareStore>,
    audit: AuditWriter,
    jwt: Arc<JwtService>,
    lockout_threshold: i32,
    lockout_minutes: i64,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn CareStore>,
        audit: AuditWriter,
        jwt: Arc<JwtService>,
        lockout_threshold: i32,
        lockout_minutes: i64,
    ) -> Self {
        Self {
            store,
            audit,
            jwt,
            lockout_threshold,
            lockout_minutes,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        ip: Option<&str>,
    ) -> Result<LoginOutcome, ServiceError> {
        let email = email.trim().to_lowercase();
        let attempt = |action, outcome, user_id: Option<Uuid>| {
            NewAuditEntry::new(action, outcome)
                .actor(user_id, Some(&email))
                .resource("user", user_id.map(|id| id.to_string()))
                .ip(ip)
        };

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            verify_against_dummy(password);
            return Err(self
                .audit
                .reject(
                    attempt(AuditAction::Login, AuditOutcome::Failure, None).details("unknown email"),
                    ServiceError::InvalidCredentials,
                )
                .await);
        };

        let now = Utc::now();
        if user.is_locked(now) {
            return Err(self
                .audit
                .reject(
                    attempt(AuditAction::Lockout, AuditOutcome::Denied, Some(user.id))
                        .details("login attempted while account locked"),
                    ServiceError::AccountLocked,
                )
                .await);
        }

        if !user.is_active {
            return Err(self
                .audit
                .reject(
                    attempt(AuditAction::Login, AuditOutcome::Failure, Some(user.id))
                        .details("inactive account"),
                    ServiceError::InvalidCredentials,
                )
                .await);
        }

        if !verify_password(password, &user.password_hash) {
            let updated = self
                .store
                .record_login_failure(
                    user.id,
                    self.lockout_threshold,
                    now + Duration::minutes(self.lockout_minutes),
                )
                .await?;
            self.audit
                .append(
                    attempt(AuditAction::Login, AuditOutcome::Failure, Some(user.id))
                        .details("invalid password"),
                )
                .await?;

            if updated.is_locked(now) {
                tracing::warn!(user_id = %user.id, "Account locked after repeated login failures");
                self.audit
                    .append(
                        attempt(AuditAction::Lockout, AuditOutcome::Denied, Some(user.id)).details(
                            format!("locked for {} minutes", self.lockout_minutes),
                        ),
                    )
                    .await?;
            }
            return Err(ServiceError::InvalidCredentials);
        }

        if user.failed_login_attempts > 0 || user.locked_until.is_some() {
            self.store.reset_login_failures(user.id).await?;
        }

        let organizations = self.store.list_user_organizations(user.id).await?;
        match organizations.as_slice() {
            [] if user.is_sysadmin() => {
                let token = self.issue_session(&user, None)?;
                self.audit
                    .append(
                        attempt(AuditAction::Login, AuditOutcome::Success, Some(user.id))
                            .details("sysadmin session without organization"),
                    )
                    .await?;
                Ok(LoginOutcome::TokenIssued(token))
            }
            [] => {
                tracing::warn!(user_id = %user.id, "Login by user with no active memberships");
                Err(self
                    .audit
                    .reject(
                        attempt(AuditAction::Login, AuditOutcome::Failure, Some(user.id))
                            .details("orphan user"),
                        ServiceError::OrphanUser,
                    )
                    .await)
            }
            [only] => {
                let token = self.issue_session(&user, Some(only))?;
                self.audit
                    .append(
                        attempt(AuditAction::Login, AuditOutcome::Success, Some(user.id))
                            .organization(Some(only.organization_id)),
                    )
                    .await?;
                Ok(LoginOutcome::TokenIssued(token))
            }
            _ => {
                let issued = self.jwt.issue(base_claims(&user, TokenUse::Selection))?;
                self.audit
                    .append(
                        attempt(AuditAction::Login, AuditOutcome::Success, Some(user.id)).details(
                            format!("organization selection required ({})", organizations.len()),
                        ),
                    )
                    .await?;
                Ok(LoginOutcome::OrganizationSelectionRequired {
                    selection_token: issued.token,
                    expires_in: issued.expires_in,
                    organizations,
                })
            }
        }
    }

    /// Complete a login that required organization selection.
    pub async fn select_organization(
        &self,
        selection_token: &str,
        organization_id: Uuid,
        ip: Option<&str>,
    ) -> Result<SessionToken, ServiceError> {
        let user_id = resolve_selection_handle(&self.jwt, selection_token)?;
        self.enter_organization(AuditAction::SelectOrganization, user_id, organization_id, ip)
            .await
    }

    /// Issue a new session token for another organization the caller belongs to.
    pub async fn switch_organization(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        ip: Option<&str>,
    ) -> Result<SessionToken, ServiceError> {
        self.enter_organization(
            AuditAction::SwitchOrganization,
            principal.user_id,
            organization_id,
            ip,
        )
        .await
    }

    async fn enter_organization(
        &self,
        action: AuditAction,
        user_id: Uuid,
        organization_id: Uuid,
        ip: Option<&str>,
    ) -> Result<SessionToken, ServiceError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::Unauthenticated)?;

        let entry = |outcome| {
            NewAuditEntry::new(action, outcome)
                .actor(Some(user.id), Some(&user.email))
                .resource("organization", Some(organization_id.to_string()))
                .ip(ip)
        };

        let membership = self
            .store
            .list_user_organizations(user.id)
            .await?
            .into_iter()
            .find(|o| o.organization_id == organization_id);

        let Some(membership) = membership else {
            return Err(self
                .audit
                .reject(
                    entry(AuditOutcome::Denied).details("no active membership"),
                    ServiceError::NotAMember,
                )
                .await);
        };

        let token = self.issue_session(&user, Some(&membership))?;
        self.audit
            .append(entry(AuditOutcome::Success).organization(Some(organization_id)))
            .await?;

        tracing::info!(
            user_id = %user.id,
            organization_id = %organization_id,
            "Session issued for organization"
        );
        Ok(token)
    }

    fn issue_session(
        &self,
        user: &User,
        membership: Option<&OrganizationSummary>,
    ) -> Result<SessionToken, ServiceError> {
        let mut claims = base_claims(user, TokenUse::Session);
        if let Some(m) = membership {
            claims.org_id = Some(m.organization_id.to_string());
            claims.org_role = Some(m.role.as_str().to_string());
            claims.is_owner = m.is_owner;
        }

        let issued = self.jwt.issue(claims)?;
        Ok(SessionToken {
            access_token: issued.token,
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
            organization_id: membership.map(|m| m.organization_id),
            org_role: membership.map(|m| m.role),
            is_owner: membership.is_some_and(|m| m.is_owner),
        })
    }
}

fn base_claims(user: &User, token_use: TokenUse) -> SessionClaims {
    SessionClaims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        org_id: None,
        org_role: None,
        is_owner: false,
        roles: user
            .global_roles
            .iter()
            .map(|r| r.as_str().to_string())
            .collect(),
        token_use,
        iss: String::new(),
        iat: 0,
        exp: 0,
        jti: String::new(),
    }
}

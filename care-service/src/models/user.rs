//! User model - global identity with no organization id of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles that apply independently of any membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalRole {
    Sysadmin,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Sysadmin => "Sysadmin",
        }
    }
}

impl std::str::FromStr for GlobalRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sysadmin" => Ok(GlobalRole::Sysadmin),
            _ => Err(format!("Invalid global role: {}", s)),
        }
    }
}

/// User entity. Tenant affiliations live entirely in memberships.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub global_roles: Vec<GlobalRole>,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user. Emails are stored lower-cased.
    pub fn new(email: &str, display_name: Option<String>, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            display_name,
            password_hash,
            global_roles: Vec::new(),
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_global_role(mut self, role: GlobalRole) -> Self {
        if !self.global_roles.contains(&role) {
            self.global_roles.push(role);
        }
        self
    }

    pub fn is_sysadmin(&self) -> bool {
        self.global_roles.contains(&GlobalRole::Sysadmin)
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Strip credentials before the user leaves the service boundary.
    pub fn sanitize(&self) -> SanitizedUser {
        SanitizedUser {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            global_roles: self.global_roles.clone(),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub global_roles: Vec<GlobalRole>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn lock_expires() {
        let mut user = User::new("Nurse@Example.com", None, "hash".into());
        assert_eq!(user.email, "nurse@example.com");

        let now = Utc::now();
        user.locked_until = Some(now + Duration::minutes(5));
        assert!(user.is_locked(now));
        assert!(!user.is_locked(now + Duration::minutes(6)));
    }
}

//! User credential + identity record.
//!
//! Users are never hard-deleted: deactivation is a status transition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use academia_core::{DomainError, DomainResult, Entity, SchoolId, UserId};

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// User is active and can authenticate.
    #[default]
    Active,
    /// Stand-in for deletion.
    Inactive,
    /// Blocked by an administrator.
    Suspended,
    /// Registered but not yet activated.
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
            UserStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            "suspended" => Some(UserStatus::Suspended),
            "pending" => Some(UserStatus::Pending),
            _ => None,
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lockout policy
// ─────────────────────────────────────────────────────────────────────────────

/// Failed-login lockout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout: Duration::minutes(15),
        }
    }
}

/// Result of recording a failed password attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedLogin {
    /// Counter incremented; `remaining` attempts before lockout.
    Counted { remaining: u32 },
    /// Threshold reached; account locked until the given instant.
    LockedOut { until: DateTime<Utc> },
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted user record.
///
/// # Invariants
/// - `email` is stored normalized (trimmed, lowercase) and is globally unique.
/// - A user without `password_hash` can never authenticate by password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub school_id: Option<SchoolId>,
    pub is_email_verified: bool,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token_expires: Option<DateTime<Utc>>,
    pub login_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize an email into its match key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal structural email check (`local@domain.tld`).
pub fn validate_email(email: &str) -> DomainResult<()> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation(format!("invalid email '{email}'")));
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(DomainError::validation(format!("invalid email '{email}'")));
    }
    Ok(())
}

impl User {
    /// Create an active user with no credentials yet.
    pub fn new(
        email: &str,
        roles: Vec<Role>,
        school_id: Option<SchoolId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_email(email)?;
        if roles.is_empty() {
            return Err(DomainError::validation("a user needs at least one role"));
        }

        Ok(Self {
            id: UserId::new(),
            email: normalize_email(email),
            first_name: None,
            last_name: None,
            password_hash: None,
            roles,
            status: UserStatus::Active,
            school_id,
            is_email_verified: false,
            refresh_token_hash: None,
            refresh_token_expires: None,
            login_attempts: 0,
            lockout_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_names(mut self, first_name: Option<String>, last_name: Option<String>) -> Self {
        self.first_name = first_name;
        self.last_name = last_name;
        self
    }

    pub fn with_password_hash(mut self, hash: String) -> Self {
        self.password_hash = Some(hash);
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn primary_role(&self) -> Option<Role> {
        Role::primary(&self.roles)
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| until > now)
    }

    /// Only accounts holding a password hash may use password login.
    pub fn can_password_login(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self.email.clone(),
        }
    }

    pub fn grant_role(&mut self, role: Role, now: DateTime<Utc>) {
        if !self.has_role(role) {
            self.roles.push(role);
            self.updated_at = now;
        }
    }

    pub fn record_failed_login(&mut self, now: DateTime<Utc>, policy: LockoutPolicy) -> FailedLogin {
        self.login_attempts += 1;
        self.updated_at = now;

        if self.login_attempts >= policy.max_attempts {
            let until = now + policy.lockout;
            self.lockout_until = Some(until);
            self.login_attempts = 0;
            return FailedLogin::LockedOut { until };
        }

        FailedLogin::Counted {
            remaining: policy.max_attempts - self.login_attempts,
        }
    }

    pub fn record_successful_login(&mut self, now: DateTime<Utc>) {
        self.login_attempts = 0;
        self.lockout_until = None;
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn set_refresh_token(&mut self, hash: String, expires: DateTime<Utc>, now: DateTime<Utc>) {
        self.refresh_token_hash = Some(hash);
        self.refresh_token_expires = Some(expires);
        self.updated_at = now;
    }

    pub fn clear_refresh_token(&mut self, now: DateTime<Utc>) {
        self.refresh_token_hash = None;
        self.refresh_token_expires = None;
        self.updated_at = now;
    }

    /// The stored refresh-token hash, if present and not yet expired.
    pub fn live_refresh_token_hash(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.refresh_token_hash, self.refresh_token_expires) {
            (Some(hash), Some(expires)) if expires > now => Some(hash),
            _ => None,
        }
    }

    pub fn change_status(&mut self, status: UserStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == status {
            return Err(DomainError::invariant(format!("user is already {status}")));
        }
        if status != UserStatus::Active {
            // A non-active user keeps no live session.
            self.refresh_token_hash = None;
            self.refresh_token_expires = None;
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

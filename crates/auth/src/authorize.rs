use serde::Serialize;
use thiserror::Error;

use crate::{Permission, Principal, SchoolContext};

/// How a list of required permissions combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Any single permission satisfies the requirement.
    #[default]
    Any,
    /// Every listed permission is needed.
    All,
}

/// Permission metadata declared by a route.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RequiredPermissions {
    pub permissions: Vec<Permission>,
    pub mode: PermissionMode,
}

impl RequiredPermissions {
    pub fn any<I, P>(permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            mode: PermissionMode::Any,
        }
    }

    pub fn all<I, P>(permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            mode: PermissionMode::All,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.permissions.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Combine per-permission outcomes according to the mode.
    pub fn satisfied_by(&self, outcomes: &[bool]) -> bool {
        match self.mode {
            PermissionMode::Any => outcomes.iter().any(|ok| *ok),
            PermissionMode::All => !outcomes.is_empty() && outcomes.iter().all(|ok| *ok),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("insufficient permissions: requires {}", .0.join(", "))]
    Forbidden(Vec<String>),
}

/// First-stage decision of the super-admin permission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Route declares nothing, or the caller is a super-admin.
    Allow,
    /// Caller is a delegated super-admin: consult its grant per permission.
    CheckDelegation,
    /// Caller holds neither role.
    Deny,
}

/// Classify a principal against route permission metadata.
///
/// - No IO
/// - No panics
pub fn classify(principal: &Principal, required: &RequiredPermissions) -> PermissionDecision {
    if required.is_empty() || principal.is_super_admin() {
        return PermissionDecision::Allow;
    }
    if principal.is_delegated_super_admin() {
        return PermissionDecision::CheckDelegation;
    }
    PermissionDecision::Deny
}

/// Authorize `resource:action` inside a resolved school context.
pub fn authorize_in_school(
    principal: &Principal,
    context: &SchoolContext,
    required: &Permission,
) -> Result<(), AuthzError> {
    if !context.is_super_admin && principal.school_id != Some(context.school_id) {
        return Err(AuthzError::TenantMismatch);
    }
    if context.has_permission(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(vec![required.as_str().to_string()]))
    }
}

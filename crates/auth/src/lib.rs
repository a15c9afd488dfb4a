//! `academia-auth` — pure authentication/authorization policy.
//!
//! This crate is intentionally decoupled from HTTP and storage: every
//! function here is deterministic given its inputs (including `now`).

pub mod authorize;
pub mod catalog;
pub mod claims;
pub mod context;
pub mod grant;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod school;
pub mod user;

pub use authorize::{
    authorize_in_school, classify, AuthzError, PermissionDecision, PermissionMode,
    RequiredPermissions,
};
pub use catalog::{PermissionDefinition, RoleDefinition};
pub use claims::{validate_claims, TokenClaims, TokenKind, TokenValidationError};
pub use context::{can_access_school, SchoolContext};
pub use grant::{
    effective_status, resolve_expiry, DelegatedGrant, GrantScope, GrantStatus, NewGrant,
    StatusEvaluation,
};
pub use permissions::{derive_permissions, matches_permission, Permission, PermissionParseError};
pub use principal::Principal;
pub use roles::Role;
pub use school::{School, SchoolStatus};
pub use user::{normalize_email, validate_email, FailedLogin, LockoutPolicy, User, UserStatus};

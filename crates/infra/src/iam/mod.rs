//! Delegated-admin authorization: grants, permission catalog, role bundles.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use academia_auth::{DelegatedGrant, Permission, PermissionParseError};
use academia_core::DomainError;

use crate::stores::{CatalogStore, GrantStore, StoreError};

pub mod dto;
mod lifecycle;
pub mod school_admins;
pub mod service;

pub use dto::{CreateGrantRequest, CreateRoleRequest, UpdateGrantRequest, UpdateRoleRequest};
pub use school_admins::SchoolAdminService;
pub use service::IamService;

#[derive(Debug, Error)]
pub enum IamError {
    #[error("{0}")]
    Validation(String),

    /// A permission name absent from the catalog (first offender).
    #[error("permission '{0}' does not exist")]
    UnknownPermission(String),

    /// A linked user belongs to a different school than the grant.
    #[error("user does not belong to this school")]
    SchoolMismatch,

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for IamError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => IamError::Conflict(msg),
            StoreError::NotFound(msg) => IamError::NotFound(msg),
            other => IamError::Store(other),
        }
    }
}

impl From<DomainError> for IamError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(what) => IamError::NotFound(what),
            DomainError::Conflict(msg) => IamError::Conflict(msg),
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => IamError::Validation(msg),
        }
    }
}

impl From<PermissionParseError> for IamError {
    fn from(err: PermissionParseError) -> Self {
        IamError::Validation(err.to_string())
    }
}

pub type IamResult<T> = Result<T, IamError>;

/// Resolve permission names against the catalog, failing on the first unknown one.
pub(crate) async fn resolve_catalog_permissions(
    catalog: &dyn CatalogStore,
    names: &[String],
) -> IamResult<Vec<Permission>> {
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        match catalog.find_permission(name).await? {
            Some(def) => resolved.push(def.permission()),
            None => return Err(IamError::UnknownPermission(name.to_string())),
        }
    }
    resolved.sort();
    resolved.dedup();
    Ok(resolved)
}

/// Reconcile a grant's stored status with its effective status, persisting
/// the new status when they diverge.
pub(crate) async fn reconcile_and_persist(
    grants: &dyn GrantStore,
    grant: &mut DelegatedGrant,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let previous = grant.status;
    if grant.reconcile(now) {
        grants.update(grant).await?;
        info!(
            event = "grant_status_reconciled",
            grant_id = %grant.id,
            from = %previous,
            to = %grant.status,
        );
    }
    Ok(())
}

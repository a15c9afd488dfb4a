//! Persistence seams for users, schools, grants and the permission catalog.
//!
//! Each store is an async trait with two implementations: an in-memory
//! backend for tests and local development, and a Postgres backend.
//! Services only ever see `Arc<dyn ...Store>`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use academia_auth::{DelegatedGrant, PermissionDefinition, RoleDefinition, School, User};
use academia_core::{GrantId, PermissionId, RoleId, SchoolId, UserId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryStores, InMemoryTable};
pub use postgres::{
    PostgresCatalogStore, PostgresGrantStore, PostgresSchoolStore, PostgresUserStore,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated (duplicate email, name, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The backend failed (connection, decoding, poisoned lock).
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Credential store
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Insert a new user. Fails with `Conflict` on a duplicate email.
    async fn insert(&self, user: User) -> StoreResult<()>;

    /// Overwrite an existing user row.
    async fn update(&self, user: &User) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<User>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenants
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait SchoolStore: Send + Sync {
    async fn get(&self, id: SchoolId) -> StoreResult<Option<School>>;
    async fn list(&self) -> StoreResult<Vec<School>>;
    async fn insert(&self, school: School) -> StoreResult<()>;
    async fn update(&self, school: &School) -> StoreResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Delegated grants
// ─────────────────────────────────────────────────────────────────────────────

/// Which grant family a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantFilter {
    /// Delegated accounts (cross-tenant).
    Global,
    /// Delegated school admins of one school.
    School(SchoolId),
    /// Delegated school admins of any school.
    AnySchool,
}

impl GrantFilter {
    pub fn matches(&self, grant: &DelegatedGrant) -> bool {
        match (self, grant.scope.school_id()) {
            (GrantFilter::Global, None) => true,
            (GrantFilter::School(wanted), Some(actual)) => *wanted == actual,
            (GrantFilter::AnySchool, Some(_)) => true,
            _ => false,
        }
    }
}

/// Storage for both grant kinds.
///
/// Email is unique per family: once among global grants and once per school
/// among school-scoped grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn get(&self, id: GrantId) -> StoreResult<Option<DelegatedGrant>>;

    async fn find_by_email(
        &self,
        filter: GrantFilter,
        email: &str,
    ) -> StoreResult<Option<DelegatedGrant>>;

    async fn insert(&self, grant: DelegatedGrant) -> StoreResult<()>;

    async fn update(&self, grant: &DelegatedGrant) -> StoreResult<()>;

    async fn list(&self, filter: GrantFilter) -> StoreResult<Vec<DelegatedGrant>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission catalog + role bundles
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_permissions(&self) -> StoreResult<Vec<PermissionDefinition>>;
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionDefinition>>;
    async fn find_permission(&self, name: &str) -> StoreResult<Option<PermissionDefinition>>;
    async fn insert_permission(&self, permission: PermissionDefinition) -> StoreResult<()>;
    /// Returns `false` when no such permission existed.
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool>;

    async fn list_roles(&self) -> StoreResult<Vec<RoleDefinition>>;
    async fn get_role(&self, id: RoleId) -> StoreResult<Option<RoleDefinition>>;
    async fn insert_role(&self, role: RoleDefinition) -> StoreResult<()>;
    async fn update_role(&self, role: &RoleDefinition) -> StoreResult<()>;
    async fn delete_role(&self, id: RoleId) -> StoreResult<bool>;
}

/// The full set of stores a deployment wires into its services.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub schools: Arc<dyn SchoolStore>,
    pub grants: Arc<dyn GrantStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

impl Stores {
    /// Fresh in-memory stores sharing one backing struct.
    pub fn in_memory() -> Self {
        let backend = Arc::new(InMemoryStores::new());
        Self {
            users: backend.clone(),
            schools: backend.clone(),
            grants: backend.clone(),
            catalog: backend,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            users: Arc::new(PostgresUserStore::new(pool.clone())),
            schools: Arc::new(PostgresSchoolStore::new(pool.clone())),
            grants: Arc::new(PostgresGrantStore::new(pool.clone())),
            catalog: Arc::new(PostgresCatalogStore::new(pool)),
        }
    }
}

//! Postgres-backed stores.
//!
//! The schema is managed outside this crate. Expected tables:
//!
//! ```sql
//! CREATE TABLE schools (
//!     id uuid PRIMARY KEY, name text NOT NULL, code text NOT NULL UNIQUE,
//!     status text NOT NULL, created_at timestamptz NOT NULL, updated_at timestamptz NOT NULL
//! );
//! CREATE TABLE users (
//!     id uuid PRIMARY KEY, email text NOT NULL UNIQUE, first_name text, last_name text,
//!     password_hash text, roles text[] NOT NULL, status text NOT NULL,
//!     school_id uuid REFERENCES schools(id), is_email_verified boolean NOT NULL,
//!     refresh_token_hash text, refresh_token_expires timestamptz,
//!     login_attempts integer NOT NULL DEFAULT 0, lockout_until timestamptz,
//!     last_login_at timestamptz, created_at timestamptz NOT NULL, updated_at timestamptz NOT NULL
//! );
//! CREATE TABLE delegated_grants (
//!     id uuid PRIMARY KEY, school_id uuid REFERENCES schools(id), user_id uuid NOT NULL,
//!     email text NOT NULL, permissions text[] NOT NULL, start_date timestamptz,
//!     expiry_date timestamptz, status text NOT NULL, notes text, created_by uuid NOT NULL,
//!     created_at timestamptz NOT NULL, updated_at timestamptz NOT NULL,
//!     suspended_by uuid, suspended_at timestamptz, revoked_by uuid, revoked_at timestamptz
//! );
//! CREATE UNIQUE INDEX delegated_grants_global_email ON delegated_grants (email) WHERE school_id IS NULL;
//! CREATE UNIQUE INDEX delegated_grants_school_email ON delegated_grants (school_id, email) WHERE school_id IS NOT NULL;
//! CREATE TABLE permissions (
//!     id uuid PRIMARY KEY, name text NOT NULL UNIQUE, resource text NOT NULL,
//!     action text NOT NULL, description text, created_at timestamptz NOT NULL
//! );
//! CREATE TABLE roles (
//!     id uuid PRIMARY KEY, name text NOT NULL UNIQUE, description text,
//!     permissions text[] NOT NULL, created_at timestamptz NOT NULL, updated_at timestamptz NOT NULL
//! );
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | Anything else | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use academia_auth::{
    normalize_email, DelegatedGrant, GrantScope, GrantStatus, Permission, PermissionDefinition,
    Role, RoleDefinition, School, SchoolStatus, User, UserStatus,
};
use academia_core::{GrantId, PermissionId, RoleId, SchoolId, UserId};

use super::{
    CatalogStore, GrantFilter, GrantStore, SchoolStore, StoreError, StoreResult, UserStore,
};

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("failed to decode column {column}: {err}"))
}

fn ensure_updated(operation: &str, rows: u64) -> StoreResult<()> {
    if rows == 0 {
        return Err(StoreError::NotFound(format!("{operation}: no matching row")));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, roles, status, \
     school_id, is_email_verified, refresh_token_hash, refresh_token_expires, login_attempts, \
     lockout_until, last_login_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let roles: Vec<String> = row.try_get("roles").map_err(|e| decode_error("roles", e))?;
    let roles = roles
        .iter()
        .map(|r| r.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| decode_error("roles", e))?;

    let status: String = row.try_get("status").map_err(|e| decode_error("status", e))?;
    let status = UserStatus::parse(&status)
        .ok_or_else(|| decode_error("status", format!("unknown user status '{status}'")))?;

    let login_attempts: i32 = row
        .try_get("login_attempts")
        .map_err(|e| decode_error("login_attempts", e))?;

    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        email: row.try_get("email").map_err(|e| decode_error("email", e))?,
        first_name: row.try_get("first_name").map_err(|e| decode_error("first_name", e))?,
        last_name: row.try_get("last_name").map_err(|e| decode_error("last_name", e))?,
        password_hash: row
            .try_get("password_hash")
            .map_err(|e| decode_error("password_hash", e))?,
        roles,
        status,
        school_id: row
            .try_get::<Option<Uuid>, _>("school_id")
            .map_err(|e| decode_error("school_id", e))?
            .map(SchoolId::from_uuid),
        is_email_verified: row
            .try_get("is_email_verified")
            .map_err(|e| decode_error("is_email_verified", e))?,
        refresh_token_hash: row
            .try_get("refresh_token_hash")
            .map_err(|e| decode_error("refresh_token_hash", e))?,
        refresh_token_expires: row
            .try_get("refresh_token_expires")
            .map_err(|e| decode_error("refresh_token_expires", e))?,
        login_attempts: login_attempts.max(0) as u32,
        lockout_until: row
            .try_get("lockout_until")
            .map_err(|e| decode_error("lockout_until", e))?,
        last_login_at: row
            .try_get("last_login_at")
            .map_err(|e| decode_error("last_login_at", e))?,
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?,
    })
}

fn role_names(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn get(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, email))]
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert(&self, user: User) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(role_names(&user.roles))
        .bind(user.status.as_str())
        .bind(user.school_id.map(Uuid::from))
        .bind(user.is_email_verified)
        .bind(&user.refresh_token_hash)
        .bind(user.refresh_token_expires)
        .bind(user.login_attempts as i32)
        .bind(user.lockout_until)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update(&self, user: &User) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = $2,
                first_name = $3,
                last_name = $4,
                password_hash = $5,
                roles = $6,
                status = $7,
                school_id = $8,
                is_email_verified = $9,
                refresh_token_hash = $10,
                refresh_token_expires = $11,
                login_attempts = $12,
                lockout_until = $13,
                last_login_at = $14,
                updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(role_names(&user.roles))
        .bind(user.status.as_str())
        .bind(user.school_id.map(Uuid::from))
        .bind(user.is_email_verified)
        .bind(&user.refresh_token_hash)
        .bind(user.refresh_token_expires)
        .bind(user.login_attempts as i32)
        .bind(user.lockout_until)
        .bind(user.last_login_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;
        ensure_updated("update_user", result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn list(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schools
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresSchoolStore {
    pool: Arc<PgPool>,
}

impl PostgresSchoolStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn school_from_row(row: &PgRow) -> StoreResult<School> {
    let status: String = row.try_get("status").map_err(|e| decode_error("status", e))?;
    Ok(School {
        id: SchoolId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        code: row.try_get("code").map_err(|e| decode_error("code", e))?,
        status: SchoolStatus::parse(&status)
            .ok_or_else(|| decode_error("status", format!("unknown school status '{status}'")))?,
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?,
    })
}

#[async_trait]
impl SchoolStore for PostgresSchoolStore {
    #[instrument(skip(self), fields(school_id = %id))]
    async fn get(&self, id: SchoolId) -> StoreResult<Option<School>> {
        let row = sqlx::query(
            "SELECT id, name, code, status, created_at, updated_at FROM schools WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_school", e))?;
        row.as_ref().map(school_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self) -> StoreResult<Vec<School>> {
        let rows = sqlx::query(
            "SELECT id, name, code, status, created_at, updated_at FROM schools ORDER BY name",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_schools", e))?;
        rows.iter().map(school_from_row).collect()
    }

    #[instrument(skip(self, school), fields(school_id = %school.id))]
    async fn insert(&self, school: School) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schools (id, name, code, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(school.id.as_uuid())
        .bind(&school.name)
        .bind(&school.code)
        .bind(school.status.as_str())
        .bind(school.created_at)
        .bind(school.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_school", e))?;
        Ok(())
    }

    #[instrument(skip(self, school), fields(school_id = %school.id))]
    async fn update(&self, school: &School) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE schools SET name = $2, code = $3, status = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(school.id.as_uuid())
        .bind(&school.name)
        .bind(&school.code)
        .bind(school.status.as_str())
        .bind(school.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_school", e))?;
        ensure_updated("update_school", result.rows_affected())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grants
// ─────────────────────────────────────────────────────────────────────────────

const GRANT_COLUMNS: &str = "id, school_id, user_id, email, permissions, start_date, \
     expiry_date, status, notes, created_by, created_at, updated_at, suspended_by, \
     suspended_at, revoked_by, revoked_at";

#[derive(Debug, Clone)]
pub struct PostgresGrantStore {
    pool: Arc<PgPool>,
}

impl PostgresGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

/// SQL predicate + optional bound school id for a filter.
fn grant_filter_clause(filter: GrantFilter) -> (&'static str, Option<Uuid>) {
    match filter {
        GrantFilter::Global => ("school_id IS NULL", None),
        GrantFilter::School(id) => ("school_id = $1", Some(*id.as_uuid())),
        GrantFilter::AnySchool => ("school_id IS NOT NULL", None),
    }
}

fn grant_from_row(row: &PgRow) -> StoreResult<DelegatedGrant> {
    let scope = match row
        .try_get::<Option<Uuid>, _>("school_id")
        .map_err(|e| decode_error("school_id", e))?
    {
        Some(id) => GrantScope::School(SchoolId::from_uuid(id)),
        None => GrantScope::Global,
    };
    let status: String = row.try_get("status").map_err(|e| decode_error("status", e))?;
    let permissions: Vec<String> = row
        .try_get("permissions")
        .map_err(|e| decode_error("permissions", e))?;
    let opt_user = |column: &str| -> StoreResult<Option<UserId>> {
        Ok(row
            .try_get::<Option<Uuid>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(UserId::from_uuid))
    };

    Ok(DelegatedGrant {
        id: GrantId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        scope,
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(|e| decode_error("user_id", e))?),
        email: row.try_get("email").map_err(|e| decode_error("email", e))?,
        permissions: permissions.into_iter().map(Permission::new).collect(),
        start_date: row.try_get("start_date").map_err(|e| decode_error("start_date", e))?,
        expiry_date: row
            .try_get("expiry_date")
            .map_err(|e| decode_error("expiry_date", e))?,
        status: GrantStatus::parse(&status)
            .ok_or_else(|| decode_error("status", format!("unknown grant status '{status}'")))?,
        notes: row.try_get("notes").map_err(|e| decode_error("notes", e))?,
        created_by: UserId::from_uuid(
            row.try_get("created_by").map_err(|e| decode_error("created_by", e))?,
        ),
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?,
        suspended_by: opt_user("suspended_by")?,
        suspended_at: row
            .try_get("suspended_at")
            .map_err(|e| decode_error("suspended_at", e))?,
        revoked_by: opt_user("revoked_by")?,
        revoked_at: row.try_get("revoked_at").map_err(|e| decode_error("revoked_at", e))?,
    })
}

fn permission_names(grant: &DelegatedGrant) -> Vec<String> {
    grant.permissions.iter().map(|p| p.as_str().to_string()).collect()
}

#[async_trait]
impl GrantStore for PostgresGrantStore {
    #[instrument(skip(self), fields(grant_id = %id))]
    async fn get(&self, id: GrantId) -> StoreResult<Option<DelegatedGrant>> {
        let row = sqlx::query(&format!(
            "SELECT {GRANT_COLUMNS} FROM delegated_grants WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_grant", e))?;
        row.as_ref().map(grant_from_row).transpose()
    }

    #[instrument(skip(self, email))]
    async fn find_by_email(
        &self,
        filter: GrantFilter,
        email: &str,
    ) -> StoreResult<Option<DelegatedGrant>> {
        let (clause, school) = grant_filter_clause(filter);
        let email = normalize_email(email);
        let row = match school {
            Some(school) => {
                sqlx::query(&format!(
                    "SELECT {GRANT_COLUMNS} FROM delegated_grants WHERE {clause} AND email = $2"
                ))
                .bind(school)
                .bind(email)
                .fetch_optional(&*self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {GRANT_COLUMNS} FROM delegated_grants WHERE {clause} AND email = $1"
                ))
                .bind(email)
                .fetch_optional(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("find_grant_by_email", e))?;
        row.as_ref().map(grant_from_row).transpose()
    }

    #[instrument(skip(self, grant), fields(grant_id = %grant.id))]
    async fn insert(&self, grant: DelegatedGrant) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO delegated_grants ({GRANT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(grant.id.as_uuid())
        .bind(grant.scope.school_id().map(Uuid::from))
        .bind(grant.user_id.as_uuid())
        .bind(&grant.email)
        .bind(permission_names(&grant))
        .bind(grant.start_date)
        .bind(grant.expiry_date)
        .bind(grant.status.as_str())
        .bind(&grant.notes)
        .bind(grant.created_by.as_uuid())
        .bind(grant.created_at)
        .bind(grant.updated_at)
        .bind(grant.suspended_by.map(Uuid::from))
        .bind(grant.suspended_at)
        .bind(grant.revoked_by.map(Uuid::from))
        .bind(grant.revoked_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_grant", e))?;
        Ok(())
    }

    #[instrument(skip(self, grant), fields(grant_id = %grant.id, status = %grant.status))]
    async fn update(&self, grant: &DelegatedGrant) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE delegated_grants SET
                permissions = $2,
                start_date = $3,
                expiry_date = $4,
                status = $5,
                notes = $6,
                updated_at = $7,
                suspended_by = $8,
                suspended_at = $9,
                revoked_by = $10,
                revoked_at = $11
            WHERE id = $1
            "#,
        )
        .bind(grant.id.as_uuid())
        .bind(permission_names(grant))
        .bind(grant.start_date)
        .bind(grant.expiry_date)
        .bind(grant.status.as_str())
        .bind(&grant.notes)
        .bind(grant.updated_at)
        .bind(grant.suspended_by.map(Uuid::from))
        .bind(grant.suspended_at)
        .bind(grant.revoked_by.map(Uuid::from))
        .bind(grant.revoked_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_grant", e))?;
        ensure_updated("update_grant", result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: GrantFilter) -> StoreResult<Vec<DelegatedGrant>> {
        let (clause, school) = grant_filter_clause(filter);
        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM delegated_grants WHERE {clause} ORDER BY created_at"
        );
        let mut query = sqlx::query(&sql);
        if let Some(school) = school {
            query = query.bind(school);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_grants", e))?;
        rows.iter().map(grant_from_row).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn permission_from_row(row: &PgRow) -> StoreResult<PermissionDefinition> {
    Ok(PermissionDefinition {
        id: PermissionId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        resource: row.try_get("resource").map_err(|e| decode_error("resource", e))?,
        action: row.try_get("action").map_err(|e| decode_error("action", e))?,
        description: row
            .try_get("description")
            .map_err(|e| decode_error("description", e))?,
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
    })
}

fn role_from_row(row: &PgRow) -> StoreResult<RoleDefinition> {
    Ok(RoleDefinition {
        id: RoleId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        description: row
            .try_get("description")
            .map_err(|e| decode_error("description", e))?,
        permissions: row
            .try_get("permissions")
            .map_err(|e| decode_error("permissions", e))?,
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?,
    })
}

const PERMISSION_COLUMNS: &str = "id, name, resource, action, description, created_at";
const ROLE_COLUMNS: &str = "id, name, description, permissions, created_at, updated_at";

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self))]
    async fn list_permissions(&self) -> StoreResult<Vec<PermissionDefinition>> {
        let rows = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY name"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }

    #[instrument(skip(self), fields(permission_id = %id))]
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionDefinition>> {
        let row = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_permission", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn find_permission(&self, name: &str) -> StoreResult<Option<PermissionDefinition>> {
        let row = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_permission", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    #[instrument(skip(self, permission), fields(name = %permission.name))]
    async fn insert_permission(&self, permission: PermissionDefinition) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO permissions ({PERMISSION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(&permission.description)
        .bind(permission.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(permission_id = %id))]
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_permission", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn list_roles(&self) -> StoreResult<Vec<RoleDefinition>> {
        let rows = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self), fields(role_id = %id))]
    async fn get_role(&self, id: RoleId) -> StoreResult<Option<RoleDefinition>> {
        let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self, role), fields(name = %role.name))]
    async fn insert_role(&self, role: RoleDefinition) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO roles ({ROLE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.permissions)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(())
    }

    #[instrument(skip(self, role), fields(role_id = %role.id))]
    async fn update_role(&self, role: &RoleDefinition) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE roles SET name = $2, description = $3, permissions = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.permissions)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;
        ensure_updated("update_role", result.rows_affected())
    }

    #[instrument(skip(self), fields(role_id = %id))]
    async fn delete_role(&self, id: RoleId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_filter_binds_school_only_when_scoped() {
        let school = SchoolId::new();
        assert_eq!(grant_filter_clause(GrantFilter::Global), ("school_id IS NULL", None));
        assert_eq!(
            grant_filter_clause(GrantFilter::School(school)),
            ("school_id = $1", Some(*school.as_uuid()))
        );
    }

    #[test]
    fn pool_closed_maps_to_backend() {
        let err = map_sqlx_error("get_user", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("get_user")));
    }
}

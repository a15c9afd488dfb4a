//! Global delegated accounts plus the permission catalog and role bundles.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use academia_auth::{permissions::catalog_pairs, DelegatedGrant, PermissionDefinition, RoleDefinition};
use academia_core::{GrantId, PermissionId, RoleId, UserId};

use super::dto::{CreateGrantRequest, CreateRoleRequest, UpdateGrantRequest, UpdateRoleRequest};
use super::lifecycle::{GrantFamily, GrantLifecycle};
use super::{IamError, IamResult};
use crate::stores::{CatalogStore, GrantStore, UserStore};

/// IAM authorization service for cross-tenant delegated accounts.
#[derive(Clone)]
pub struct IamService {
    lifecycle: GrantLifecycle,
}

impl IamService {
    pub fn new(
        users: Arc<dyn UserStore>,
        grants: Arc<dyn GrantStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            lifecycle: GrantLifecycle {
                users,
                grants,
                catalog,
            },
        }
    }

    fn catalog(&self) -> &dyn CatalogStore {
        self.lifecycle.catalog.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Delegated accounts
    // ─────────────────────────────────────────────────────────────────────

    pub async fn create_delegated_account(
        &self,
        req: CreateGrantRequest,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle.create(GrantFamily::global(), req, created_by, now).await
    }

    pub async fn get_delegated_account(&self, id: GrantId, now: DateTime<Utc>) -> IamResult<DelegatedGrant> {
        self.lifecycle.load(GrantFamily::global(), id, now).await
    }

    pub async fn list_delegated_accounts(&self, now: DateTime<Utc>) -> IamResult<Vec<DelegatedGrant>> {
        self.lifecycle.list(GrantFamily::global(), now).await
    }

    pub async fn update_delegated_account(
        &self,
        id: GrantId,
        req: UpdateGrantRequest,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle.update(GrantFamily::global(), id, req, now).await
    }

    pub async fn suspend_delegated_account(
        &self,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle.suspend(GrantFamily::global(), id, by, now).await
    }

    pub async fn unsuspend_delegated_account(
        &self,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle.unsuspend(GrantFamily::global(), id, by, now).await
    }

    pub async fn revoke_delegated_account(
        &self,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle.revoke(GrantFamily::global(), id, by, now).await
    }

    /// Whether the delegated account of `email` covers `required` right now.
    pub async fn check_delegated_account_access(
        &self,
        email: &str,
        required: &str,
        now: DateTime<Utc>,
    ) -> IamResult<bool> {
        self.lifecycle
            .check_access(GrantFamily::global(), email, required, now)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Permission catalog
    // ─────────────────────────────────────────────────────────────────────

    pub async fn get_all_permissions(&self) -> IamResult<Vec<PermissionDefinition>> {
        Ok(self.catalog().list_permissions().await?)
    }

    #[instrument(skip(self, description))]
    pub async fn create_permission(
        &self,
        resource: &str,
        action: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> IamResult<PermissionDefinition> {
        let definition = PermissionDefinition::new(resource, action, description, now)?;
        if self.catalog().find_permission(&definition.name).await?.is_some() {
            return Err(IamError::Conflict(format!(
                "permission '{}' already exists",
                definition.name
            )));
        }
        self.catalog().insert_permission(definition.clone()).await?;
        Ok(definition)
    }

    pub async fn delete_permission(&self, id: PermissionId) -> IamResult<()> {
        if !self.catalog().delete_permission(id).await? {
            return Err(IamError::NotFound("permission".to_string()));
        }
        Ok(())
    }

    /// Insert every catalog `resource:action` pair that is not present yet.
    ///
    /// Returns the number of entries added.
    #[instrument(skip(self))]
    pub async fn seed_default_catalog(&self, now: DateTime<Utc>) -> IamResult<usize> {
        let mut added = 0;
        for (resource, action) in catalog_pairs() {
            let definition = PermissionDefinition::new(resource, action, None, now)?;
            if self.catalog().find_permission(&definition.name).await?.is_none() {
                self.catalog().insert_permission(definition).await?;
                added += 1;
            }
        }
        if added > 0 {
            info!(event = "permission_catalog_seeded", added);
        }
        Ok(added)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────

    async fn ensure_known(&self, names: &[String]) -> IamResult<Vec<String>> {
        let resolved = super::resolve_catalog_permissions(self.catalog(), names).await?;
        Ok(resolved.iter().map(|p| p.as_str().to_string()).collect())
    }

    pub async fn create_role(&self, req: CreateRoleRequest, now: DateTime<Utc>) -> IamResult<RoleDefinition> {
        let permissions = self.ensure_known(&req.permissions).await?;
        let role = RoleDefinition::new(&req.name, req.description, permissions, now)?;
        self.catalog().insert_role(role.clone()).await?;
        Ok(role)
    }

    pub async fn get_role(&self, id: RoleId) -> IamResult<RoleDefinition> {
        self.catalog()
            .get_role(id)
            .await?
            .ok_or_else(|| IamError::NotFound("role".to_string()))
    }

    pub async fn list_roles(&self) -> IamResult<Vec<RoleDefinition>> {
        Ok(self.catalog().list_roles().await?)
    }

    pub async fn update_role(
        &self,
        id: RoleId,
        req: UpdateRoleRequest,
        now: DateTime<Utc>,
    ) -> IamResult<RoleDefinition> {
        let mut role = self.get_role(id).await?;

        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(IamError::Validation("role name is required".to_string()));
            }
            role.name = name.to_string();
        }
        if let Some(description) = req.description {
            role.description = Some(description);
        }
        match req.permissions {
            Some(names) => {
                let permissions = self.ensure_known(&names).await?;
                role.set_permissions(permissions, now);
            }
            None => role.updated_at = now,
        }

        self.catalog().update_role(&role).await?;
        Ok(role)
    }

    pub async fn delete_role(&self, id: RoleId) -> IamResult<()> {
        if !self.catalog().delete_role(id).await? {
            return Err(IamError::NotFound("role".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryStores;
    use academia_auth::{GrantStatus, Role};
    use chrono::Duration;

    struct Fixture {
        stores: Arc<InMemoryStores>,
        iam: IamService,
        admin: UserId,
    }

    async fn fixture() -> Fixture {
        let stores = Arc::new(InMemoryStores::new());
        let iam = IamService::new(stores.clone(), stores.clone(), stores.clone());
        iam.seed_default_catalog(Utc::now()).await.unwrap();
        Fixture {
            stores,
            iam,
            admin: UserId::new(),
        }
    }

    fn request(email: &str, permissions: &[&str]) -> CreateGrantRequest {
        CreateGrantRequest {
            email: email.to_string(),
            first_name: Some("Dana".into()),
            last_name: Some("Reyes".into()),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let f = fixture().await;
        let total = f.iam.get_all_permissions().await.unwrap().len();
        assert_eq!(total, 7 * 6);
        assert_eq!(f.iam.seed_default_catalog(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_provisions_password_less_delegated_user() {
        let f = fixture().await;
        let grant = f
            .iam
            .create_delegated_account(request("Dana@Ops.io", &["schools:read"]), f.admin, Utc::now())
            .await
            .unwrap();

        assert_eq!(grant.email, "dana@ops.io");
        assert_eq!(grant.status, GrantStatus::Active);

        let user = UserStore::get(f.stores.as_ref(), grant.user_id).await.unwrap().unwrap();
        assert!(user.has_role(Role::DelegatedSuperAdmin));
        assert!(user.password_hash.is_none());
        assert!(user.is_email_verified);
    }

    #[tokio::test]
    async fn unknown_permission_is_named() {
        let f = fixture().await;
        let err = f
            .iam
            .create_delegated_account(
                request("d@ops.io", &["schools:read", "students:read"]),
                f.admin,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::UnknownPermission(ref p) if p == "students:read"));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let f = fixture().await;
        f.iam
            .create_delegated_account(request("d@ops.io", &["schools:read"]), f.admin, Utc::now())
            .await
            .unwrap();
        let err = f
            .iam
            .create_delegated_account(request("D@ops.io", &["users:read"]), f.admin, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::Conflict(_)));
    }

    #[tokio::test]
    async fn wildcard_grant_covers_matching_permissions() {
        let f = fixture().await;
        f.iam
            .create_delegated_account(request("d@ops.io", &["schools:*", "*:read"]), f.admin, Utc::now())
            .await
            .unwrap();

        let now = Utc::now();
        assert!(f.iam.check_delegated_account_access("d@ops.io", "schools:delete", now).await.unwrap());
        assert!(f.iam.check_delegated_account_access("d@ops.io", "audit:read", now).await.unwrap());
        assert!(!f.iam.check_delegated_account_access("d@ops.io", "users:create", now).await.unwrap());
        assert!(!f.iam.check_delegated_account_access("nobody@ops.io", "schools:read", now).await.unwrap());
    }

    #[tokio::test]
    async fn expired_grant_is_flipped_on_first_check() {
        let f = fixture().await;
        let created = Utc::now() - Duration::days(10);
        let mut req = request("d@ops.io", &["schools:read"]);
        req.expiry_date = Some(created + Duration::days(1));
        let grant = f.iam.create_delegated_account(req, f.admin, created).await.unwrap();
        assert_eq!(grant.status, GrantStatus::Active);

        let now = Utc::now();
        assert!(!f.iam.check_delegated_account_access("d@ops.io", "schools:read", now).await.unwrap());
        let stored = GrantStore::get(f.stores.as_ref(), grant.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GrantStatus::Expired);

        assert!(!f.iam.check_delegated_account_access("d@ops.io", "schools:read", now).await.unwrap());
        let stored = GrantStore::get(f.stores.as_ref(), grant.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GrantStatus::Expired);
    }

    #[tokio::test]
    async fn future_start_denies_until_started() {
        let f = fixture().await;
        let now = Utc::now();
        let mut req = request("d@ops.io", &["schools:read"]);
        req.start_date = Some(now + Duration::days(30));
        f.iam.create_delegated_account(req, f.admin, now).await.unwrap();

        assert!(!f.iam.check_delegated_account_access("d@ops.io", "schools:read", now).await.unwrap());
        let later = now + Duration::days(31);
        assert!(f.iam.check_delegated_account_access("d@ops.io", "schools:read", later).await.unwrap());
    }

    #[tokio::test]
    async fn suspend_unsuspend_revoke() {
        let f = fixture().await;
        let now = Utc::now();
        let grant = f
            .iam
            .create_delegated_account(request("d@ops.io", &["schools:read"]), f.admin, now)
            .await
            .unwrap();

        let suspended = f.iam.suspend_delegated_account(grant.id, f.admin, now).await.unwrap();
        assert_eq!(suspended.status, GrantStatus::Suspended);
        assert!(!f.iam.check_delegated_account_access("d@ops.io", "schools:read", now).await.unwrap());

        let resumed = f.iam.unsuspend_delegated_account(grant.id, f.admin, now).await.unwrap();
        assert_eq!(resumed.status, GrantStatus::Active);

        let revoked = f.iam.revoke_delegated_account(grant.id, f.admin, now).await.unwrap();
        assert_eq!(revoked.status, GrantStatus::Revoked);
        assert_eq!(revoked.revoked_by, Some(f.admin));

        let err = f.iam.unsuspend_delegated_account(grant.id, f.admin, now).await.unwrap_err();
        assert!(matches!(err, IamError::Validation(_)));
    }

    #[tokio::test]
    async fn update_revalidates_permissions() {
        let f = fixture().await;
        let now = Utc::now();
        let grant = f
            .iam
            .create_delegated_account(request("d@ops.io", &["schools:read"]), f.admin, now)
            .await
            .unwrap();

        let bad = UpdateGrantRequest {
            permissions: Some(vec!["bogus:read".into()]),
            ..Default::default()
        };
        assert!(matches!(
            f.iam.update_delegated_account(grant.id, bad, now).await,
            Err(IamError::UnknownPermission(_))
        ));

        let good = UpdateGrantRequest {
            permissions: Some(vec!["users:read".into()]),
            notes: Some("rotated".into()),
            ..Default::default()
        };
        let updated = f.iam.update_delegated_account(grant.id, good, now).await.unwrap();
        assert_eq!(updated.permissions.len(), 1);
        assert_eq!(updated.permissions[0].as_str(), "users:read");
        assert_eq!(updated.notes.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let f = fixture().await;
        let now = Utc::now();
        assert!(matches!(
            f.iam.get_delegated_account(GrantId::new(), now).await,
            Err(IamError::NotFound(_))
        ));
        assert!(matches!(f.iam.get_role(RoleId::new()).await, Err(IamError::NotFound(_))));
        assert!(matches!(
            f.iam.delete_permission(PermissionId::new()).await,
            Err(IamError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn roles_only_reference_catalog_permissions() {
        let f = fixture().await;
        let now = Utc::now();
        let role = f
            .iam
            .create_role(
                CreateRoleRequest {
                    name: "auditor".into(),
                    description: None,
                    permissions: vec!["audit:read".into()],
                },
                now,
            )
            .await
            .unwrap();

        let err = f
            .iam
            .update_role(
                role.id,
                UpdateRoleRequest {
                    permissions: Some(vec!["audit:approve".into()]),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::UnknownPermission(_)));

        f.iam.delete_role(role.id).await.unwrap();
        assert!(f.iam.list_roles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_permission_conflicts() {
        let f = fixture().await;
        let err = f
            .iam
            .create_permission("schools", "read", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::Conflict(_)));
    }
}

//! Grant lifecycle shared by delegated accounts and delegated school admins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use academia_auth::{validate_email, DelegatedGrant, GrantScope, NewGrant, Role, User};
use academia_core::{GrantId, SchoolId, UserId};

use super::dto::{CreateGrantRequest, UpdateGrantRequest};
use super::{reconcile_and_persist, resolve_catalog_permissions, IamError, IamResult};
use crate::stores::{CatalogStore, GrantFilter, GrantStore, UserStore};

/// What differs between the two grant families.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrantFamily {
    pub scope: GrantScope,
    /// Role the grant's owner must hold for guards to consult the grant.
    pub role: Role,
}

impl GrantFamily {
    pub fn global() -> Self {
        Self {
            scope: GrantScope::Global,
            role: Role::DelegatedSuperAdmin,
        }
    }

    pub fn school(school_id: SchoolId) -> Self {
        Self {
            scope: GrantScope::School(school_id),
            role: Role::DelegatedSchoolAdmin,
        }
    }

    pub fn filter(&self) -> GrantFilter {
        match self.scope {
            GrantScope::Global => GrantFilter::Global,
            GrantScope::School(id) => GrantFilter::School(id),
        }
    }
}

#[derive(Clone)]
pub(crate) struct GrantLifecycle {
    pub users: Arc<dyn UserStore>,
    pub grants: Arc<dyn GrantStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

impl GrantLifecycle {
    #[instrument(skip(self, req), fields(scope = ?family.scope))]
    pub async fn create(
        &self,
        family: GrantFamily,
        req: CreateGrantRequest,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        validate_email(&req.email)?;
        let permissions = resolve_catalog_permissions(self.catalog.as_ref(), &req.permissions).await?;

        if self
            .grants
            .find_by_email(family.filter(), &req.email)
            .await?
            .is_some()
        {
            return Err(IamError::Conflict(format!(
                "a delegated grant already exists for {}",
                req.email.trim()
            )));
        }

        let user = self.resolve_owner(family, &req, now).await?;

        let grant = DelegatedGrant::new(
            NewGrant {
                scope: family.scope,
                user_id: user.id,
                email: user.email.clone(),
                permissions,
                start_date: req.start_date,
                expiry_date: req.resolved_expiry(),
                notes: req.notes.clone(),
                created_by,
            },
            now,
        )?;
        self.grants.insert(grant.clone()).await?;

        info!(event = "grant_created", grant_id = %grant.id, user_id = %user.id, status = %grant.status);
        Ok(grant)
    }

    /// Link an existing user or create a password-less one.
    async fn resolve_owner(
        &self,
        family: GrantFamily,
        req: &CreateGrantRequest,
        now: DateTime<Utc>,
    ) -> IamResult<User> {
        let existing = match req.user_id {
            Some(id) => Some(
                self.users
                    .get(id)
                    .await?
                    .ok_or_else(|| IamError::NotFound("user".to_string()))?,
            ),
            None => self.users.find_by_email(&req.email).await?,
        };

        match existing {
            Some(mut user) => {
                if let Some(school_id) = family.scope.school_id() {
                    if user.school_id != Some(school_id) {
                        return Err(IamError::SchoolMismatch);
                    }
                }
                if !user.has_role(family.role) {
                    user.grant_role(family.role, now);
                    self.users.update(&user).await?;
                }
                Ok(user)
            }
            None if req.has_names() => {
                let mut user = User::new(&req.email, vec![family.role], family.scope.school_id(), now)?
                    .with_names(req.first_name.clone(), req.last_name.clone());
                user.is_email_verified = true;
                self.users.insert(user.clone()).await?;
                info!(event = "delegated_user_created", user_id = %user.id);
                Ok(user)
            }
            None => Err(IamError::Validation(
                "userId or firstName/lastName is required for an unknown email".to_string(),
            )),
        }
    }

    /// Load a grant of this family and reconcile its stored status.
    pub async fn load(
        &self,
        family: GrantFamily,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        let mut grant = self
            .grants
            .get(id)
            .await?
            .filter(|g| family.filter().matches(g))
            .ok_or_else(|| IamError::NotFound("delegated grant".to_string()))?;
        reconcile_and_persist(self.grants.as_ref(), &mut grant, now).await?;
        Ok(grant)
    }

    pub async fn list(&self, family: GrantFamily, now: DateTime<Utc>) -> IamResult<Vec<DelegatedGrant>> {
        let mut grants = self.grants.list(family.filter()).await?;
        for grant in &mut grants {
            reconcile_and_persist(self.grants.as_ref(), grant, now).await?;
        }
        Ok(grants)
    }

    #[instrument(skip(self, req), fields(grant_id = %id))]
    pub async fn update(
        &self,
        family: GrantFamily,
        id: GrantId,
        req: UpdateGrantRequest,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        let mut grant = self.load(family, id, now).await?;

        if let Some(names) = &req.permissions {
            let permissions = resolve_catalog_permissions(self.catalog.as_ref(), names).await?;
            grant.set_permissions(permissions, now)?;
        }
        if req.touches_window() {
            grant.set_window(req.start_date, req.resolved_expiry(), now)?;
        }
        if let Some(notes) = req.notes {
            grant.notes = Some(notes);
            grant.updated_at = now;
        }

        self.grants.update(&grant).await?;
        Ok(grant)
    }

    #[instrument(skip(self), fields(grant_id = %id, by = %by))]
    pub async fn suspend(
        &self,
        family: GrantFamily,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        let mut grant = self.load(family, id, now).await?;
        grant.suspend(by, now)?;
        self.grants.update(&grant).await?;
        info!(event = "grant_suspended", grant_id = %grant.id);
        Ok(grant)
    }

    #[instrument(skip(self), fields(grant_id = %id, by = %by))]
    pub async fn unsuspend(
        &self,
        family: GrantFamily,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        let mut grant = self.load(family, id, now).await?;
        grant.unsuspend(now)?;
        self.grants.update(&grant).await?;
        info!(event = "grant_unsuspended", grant_id = %grant.id, status = %grant.status);
        Ok(grant)
    }

    #[instrument(skip(self), fields(grant_id = %id, by = %by))]
    pub async fn revoke(
        &self,
        family: GrantFamily,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        let mut grant = self.load(family, id, now).await?;
        grant.revoke(by, now)?;
        self.grants.update(&grant).await?;
        info!(event = "grant_revoked", grant_id = %grant.id);
        Ok(grant)
    }

    /// Whether the grant for `email` is effectively active and covers `required`.
    ///
    /// Reconciles (and persists) the grant status first, so an expired grant
    /// is flipped to `expired` by the first check that notices.
    pub async fn check_access(
        &self,
        family: GrantFamily,
        email: &str,
        required: &str,
        now: DateTime<Utc>,
    ) -> IamResult<bool> {
        let Some(mut grant) = self.grants.find_by_email(family.filter(), email).await? else {
            return Ok(false);
        };
        reconcile_and_persist(self.grants.as_ref(), &mut grant, now).await?;
        Ok(grant.allows(required, now))
    }
}

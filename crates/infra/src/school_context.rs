//! Per-request school (tenant) context resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use academia_auth::{can_access_school, GrantStatus, Role, SchoolContext, User};
use academia_core::{SchoolId, UserId};

use crate::iam::reconcile_and_persist;
use crate::stores::{GrantFilter, GrantStore, SchoolStore, StoreError, UserStore};

#[derive(Debug, Error)]
pub enum SchoolContextError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct SchoolContextService {
    users: Arc<dyn UserStore>,
    schools: Arc<dyn SchoolStore>,
    grants: Arc<dyn GrantStore>,
}

impl SchoolContextService {
    pub fn new(
        users: Arc<dyn UserStore>,
        schools: Arc<dyn SchoolStore>,
        grants: Arc<dyn GrantStore>,
    ) -> Self {
        Self {
            users,
            schools,
            grants,
        }
    }

    /// Resolve the context of `user_id` inside `school_id`, or inside the
    /// user's own school when no id is given.
    ///
    /// `None` when the user or school is unknown, or when there is neither an
    /// explicit id nor an affiliation (no tenant scoping applies).
    #[instrument(skip(self, now))]
    pub async fn get_school_context(
        &self,
        user_id: UserId,
        school_id: Option<SchoolId>,
        now: DateTime<Utc>,
    ) -> Result<Option<SchoolContext>, SchoolContextError> {
        let Some(user) = self.users.get(user_id).await? else {
            return Ok(None);
        };
        let Some(target) = school_id.or(user.school_id) else {
            return Ok(None);
        };
        let Some(school) = self.schools.get(target).await? else {
            return Ok(None);
        };
        let Some(mut context) = SchoolContext::build(&user, school) else {
            return Ok(None);
        };

        self.apply_school_admin_grant(&user, &mut context, now).await?;
        Ok(Some(context))
    }

    /// Fold the user's delegated school-admin grant for this school, when
    /// effectively active, into the context permissions.
    async fn apply_school_admin_grant(
        &self,
        user: &User,
        context: &mut SchoolContext,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !user.has_role(Role::DelegatedSchoolAdmin) || user.school_id != Some(context.school_id) {
            return Ok(());
        }
        let filter = GrantFilter::School(context.school_id);
        let Some(mut grant) = self.grants.find_by_email(filter, &user.email).await? else {
            return Ok(());
        };
        if grant.user_id != user.id {
            return Ok(());
        }

        reconcile_and_persist(self.grants.as_ref(), &mut grant, now).await?;
        if grant.effective_status(now) == GrantStatus::Active {
            context.extend_with_grant(&grant.permissions);
        }
        Ok(())
    }

    /// Tenant-isolation check: super-admins reach every school (even one with
    /// no row), everyone else only their own.
    #[instrument(skip(self))]
    pub async fn validate_school_access(
        &self,
        user_id: UserId,
        school_id: SchoolId,
    ) -> Result<bool, SchoolContextError> {
        Ok(self
            .users
            .get(user_id)
            .await?
            .is_some_and(|user| can_access_school(&user, school_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::{CreateGrantRequest, SchoolAdminService};
    use crate::stores::InMemoryStores;
    use crate::IamService;
    use academia_auth::School;

    struct Fixture {
        stores: Arc<InMemoryStores>,
        service: SchoolContextService,
        school: School,
    }

    async fn fixture() -> Fixture {
        let stores = Arc::new(InMemoryStores::new());
        let school = School::new("Lakeview", "LV", Utc::now()).unwrap();
        SchoolStore::insert(stores.as_ref(), school.clone()).await.unwrap();
        let service = SchoolContextService::new(stores.clone(), stores.clone(), stores.clone());
        Fixture {
            stores,
            service,
            school,
        }
    }

    async fn add_user(f: &Fixture, email: &str, role: Role, school: Option<SchoolId>) -> User {
        let user = User::new(email, vec![role], school, Utc::now()).unwrap();
        UserStore::insert(f.stores.as_ref(), user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn affiliated_school_is_used_by_default() {
        let f = fixture().await;
        let admin = add_user(&f, "head@lv.edu", Role::SchoolAdmin, Some(f.school.id)).await;

        let ctx = f.service.get_school_context(admin.id, None, Utc::now()).await.unwrap().unwrap();
        assert_eq!(ctx.school_id, f.school.id);
        assert!(ctx.is_school_admin);
        assert!(!ctx.is_super_admin);
        assert!(ctx.has_permission("students:create"));
    }

    #[tokio::test]
    async fn super_admin_without_home_school_gets_none_unless_explicit() {
        let f = fixture().await;
        let root = add_user(&f, "root@academia.io", Role::SuperAdmin, None).await;

        assert!(f.service.get_school_context(root.id, None, Utc::now()).await.unwrap().is_none());

        let ctx = f
            .service
            .get_school_context(root.id, Some(f.school.id), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.is_super_admin);
        assert!(!ctx.is_school_admin);
    }

    #[tokio::test]
    async fn unknown_user_or_school_yields_none() {
        let f = fixture().await;
        assert!(f.service.get_school_context(UserId::new(), None, Utc::now()).await.unwrap().is_none());

        let teacher = add_user(&f, "t@lv.edu", Role::Teacher, Some(f.school.id)).await;
        let missing = f
            .service
            .get_school_context(teacher.id, Some(SchoolId::new()), Utc::now())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn access_validation_isolates_tenants() {
        let f = fixture().await;
        let root = add_user(&f, "root@academia.io", Role::SuperAdmin, None).await;
        let teacher = add_user(&f, "t@lv.edu", Role::Teacher, Some(f.school.id)).await;

        let nowhere = SchoolId::new();
        assert!(f.service.validate_school_access(root.id, nowhere).await.unwrap());
        assert!(f.service.validate_school_access(teacher.id, f.school.id).await.unwrap());
        assert!(!f.service.validate_school_access(teacher.id, nowhere).await.unwrap());
        assert!(!f.service.validate_school_access(UserId::new(), f.school.id).await.unwrap());
    }

    #[tokio::test]
    async fn delegated_school_admin_grant_extends_permissions() {
        let f = fixture().await;
        IamService::new(f.stores.clone(), f.stores.clone(), f.stores.clone())
            .seed_default_catalog(Utc::now())
            .await
            .unwrap();
        let admins = SchoolAdminService::new(f.stores.clone(), f.stores.clone(), f.stores.clone(), f.stores.clone());
        let grant = admins
            .create(
                f.school.id,
                CreateGrantRequest {
                    email: "deputy@lv.edu".into(),
                    first_name: Some("Deputy".into()),
                    permissions: vec!["analytics:read".into()],
                    ..Default::default()
                },
                UserId::new(),
                Utc::now(),
            )
            .await
            .unwrap();

        let ctx = f
            .service
            .get_school_context(grant.user_id, None, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.has_permission("analytics:read"));
        assert!(!ctx.has_permission("analytics:delete"));

        admins.suspend(f.school.id, grant.id, UserId::new(), Utc::now()).await.unwrap();
        let ctx = f
            .service
            .get_school_context(grant.user_id, None, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(!ctx.has_permission("analytics:read"));
    }
}

//! Delegated school admins: grants scoped to a single school.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use academia_auth::DelegatedGrant;
use academia_core::{GrantId, SchoolId, UserId};

use super::dto::{CreateGrantRequest, UpdateGrantRequest};
use super::lifecycle::{GrantFamily, GrantLifecycle};
use super::{IamError, IamResult};
use crate::stores::{CatalogStore, GrantStore, SchoolStore, UserStore};

/// Same lifecycle as delegated accounts, with every operation pinned to one
/// school and the owning user required to belong to it.
#[derive(Clone)]
pub struct SchoolAdminService {
    lifecycle: GrantLifecycle,
    schools: Arc<dyn SchoolStore>,
}

impl SchoolAdminService {
    pub fn new(
        users: Arc<dyn UserStore>,
        schools: Arc<dyn SchoolStore>,
        grants: Arc<dyn GrantStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            lifecycle: GrantLifecycle {
                users,
                grants,
                catalog,
            },
            schools,
        }
    }

    async fn family(&self, school_id: SchoolId) -> IamResult<GrantFamily> {
        if self.schools.get(school_id).await?.is_none() {
            return Err(IamError::NotFound("school".to_string()));
        }
        Ok(GrantFamily::school(school_id))
    }

    pub async fn create(
        &self,
        school_id: SchoolId,
        req: CreateGrantRequest,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        let family = self.family(school_id).await?;
        self.lifecycle.create(family, req, created_by, now).await
    }

    pub async fn get(&self, school_id: SchoolId, id: GrantId, now: DateTime<Utc>) -> IamResult<DelegatedGrant> {
        self.lifecycle.load(GrantFamily::school(school_id), id, now).await
    }

    pub async fn list(&self, school_id: SchoolId, now: DateTime<Utc>) -> IamResult<Vec<DelegatedGrant>> {
        self.lifecycle.list(GrantFamily::school(school_id), now).await
    }

    pub async fn update(
        &self,
        school_id: SchoolId,
        id: GrantId,
        req: UpdateGrantRequest,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle
            .update(GrantFamily::school(school_id), id, req, now)
            .await
    }

    pub async fn suspend(
        &self,
        school_id: SchoolId,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle
            .suspend(GrantFamily::school(school_id), id, by, now)
            .await
    }

    pub async fn unsuspend(
        &self,
        school_id: SchoolId,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle
            .unsuspend(GrantFamily::school(school_id), id, by, now)
            .await
    }

    pub async fn revoke(
        &self,
        school_id: SchoolId,
        id: GrantId,
        by: UserId,
        now: DateTime<Utc>,
    ) -> IamResult<DelegatedGrant> {
        self.lifecycle
            .revoke(GrantFamily::school(school_id), id, by, now)
            .await
    }

    pub async fn check_access(
        &self,
        school_id: SchoolId,
        email: &str,
        required: &str,
        now: DateTime<Utc>,
    ) -> IamResult<bool> {
        self.lifecycle
            .check_access(GrantFamily::school(school_id), email, required, now)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryStores;
    use crate::IamService;
    use academia_auth::{GrantStatus, Role, School, User};
    use chrono::Duration;

    struct Fixture {
        stores: Arc<InMemoryStores>,
        service: SchoolAdminService,
        school: School,
    }

    async fn fixture() -> Fixture {
        let stores = Arc::new(InMemoryStores::new());
        IamService::new(stores.clone(), stores.clone(), stores.clone())
            .seed_default_catalog(Utc::now())
            .await
            .unwrap();
        let school = School::new("Northside High", "nsh", Utc::now()).unwrap();
        SchoolStore::insert(stores.as_ref(), school.clone()).await.unwrap();
        let service = SchoolAdminService::new(stores.clone(), stores.clone(), stores.clone(), stores.clone());
        Fixture {
            stores,
            service,
            school,
        }
    }

    fn request(email: &str) -> CreateGrantRequest {
        CreateGrantRequest {
            email: email.to_string(),
            first_name: Some("Sam".into()),
            permissions: vec!["users:read".into(), "settings:update".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_user_belongs_to_the_school() {
        let f = fixture().await;
        let grant = f
            .service
            .create(f.school.id, request("sam@nsh.edu"), UserId::new(), Utc::now())
            .await
            .unwrap();

        let user = UserStore::get(f.stores.as_ref(), grant.user_id).await.unwrap().unwrap();
        assert_eq!(user.school_id, Some(f.school.id));
        assert!(user.has_role(Role::DelegatedSchoolAdmin));
    }

    #[tokio::test]
    async fn linking_a_user_from_another_school_is_rejected() {
        let f = fixture().await;
        let outsider = User::new("out@other.edu", vec![Role::Teacher], Some(SchoolId::new()), Utc::now()).unwrap();
        UserStore::insert(f.stores.as_ref(), outsider.clone()).await.unwrap();

        let mut req = request("out@other.edu");
        req.user_id = Some(outsider.id);
        let err = f.service.create(f.school.id, req, UserId::new(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, IamError::SchoolMismatch));
    }

    #[tokio::test]
    async fn unknown_school_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .create(SchoolId::new(), request("sam@nsh.edu"), UserId::new(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::NotFound(_)));
    }

    #[tokio::test]
    async fn grants_are_invisible_from_other_schools() {
        let f = fixture().await;
        let grant = f
            .service
            .create(f.school.id, request("sam@nsh.edu"), UserId::new(), Utc::now())
            .await
            .unwrap();

        let other = SchoolId::new();
        assert!(matches!(
            f.service.get(other, grant.id, Utc::now()).await,
            Err(IamError::NotFound(_))
        ));
        assert!(f.service.list(other, Utc::now()).await.unwrap().is_empty());
        assert!(!f.service.check_access(other, "sam@nsh.edu", "users:read", Utc::now()).await.unwrap());
        assert!(f.service.check_access(f.school.id, "sam@nsh.edu", "users:read", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn suspension_survives_passing_start_date() {
        let f = fixture().await;
        let now = Utc::now();
        let mut req = request("sam@nsh.edu");
        req.start_date = Some(now + Duration::days(1));
        let grant = f.service.create(f.school.id, req, UserId::new(), now).await.unwrap();
        assert_eq!(grant.status, GrantStatus::Inactive);

        f.service.suspend(f.school.id, grant.id, UserId::new(), now).await.unwrap();

        let later = now + Duration::days(2);
        let read = f.service.get(f.school.id, grant.id, later).await.unwrap();
        assert_eq!(read.status, GrantStatus::Suspended);

        let resumed = f.service.unsuspend(f.school.id, grant.id, UserId::new(), later).await.unwrap();
        assert_eq!(resumed.status, GrantStatus::Active);
    }

    #[tokio::test]
    async fn extending_an_expired_grant_reactivates_it() {
        let f = fixture().await;
        let created = Utc::now() - Duration::days(5);
        let mut req = request("sam@nsh.edu");
        req.expiry_date = Some(created + Duration::days(1));
        let grant = f.service.create(f.school.id, req, UserId::new(), created).await.unwrap();

        let now = Utc::now();
        let listed = f.service.list(f.school.id, now).await.unwrap();
        assert_eq!(listed[0].status, GrantStatus::Expired);

        let extended = f
            .service
            .update(
                f.school.id,
                grant.id,
                UpdateGrantRequest {
                    expiry_date: Some(now + Duration::days(30)),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(extended.status, GrantStatus::Active);
    }
}

//! Service wiring: stores, token/session services, IAM and tenant resolution.

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use academia_auth::{Role, User};
use academia_core::DomainError;
use academia_infra::{
    IamError, IamService, PasswordError, PasswordHasher, SchoolAdminService, SchoolContextService,
    SessionService, StoreError, Stores, TokenService,
};

use crate::config::{AppConfig, BootstrapAdmin};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to seed the permission catalog: {0}")]
    Catalog(#[from] IamError),

    #[error("failed to create the bootstrap super-admin: {0}")]
    Bootstrap(String),
}

impl From<StoreError> for StartupError {
    fn from(err: StoreError) -> Self {
        StartupError::Bootstrap(err.to_string())
    }
}

impl From<PasswordError> for StartupError {
    fn from(err: PasswordError) -> Self {
        StartupError::Bootstrap(err.to_string())
    }
}

impl From<DomainError> for StartupError {
    fn from(err: DomainError) -> Self {
        StartupError::Bootstrap(err.to_string())
    }
}

pub struct AppServices {
    pub config: AppConfig,
    pub stores: Stores,
    pub hasher: PasswordHasher,
    pub sessions: SessionService,
    pub iam: IamService,
    pub school_admins: SchoolAdminService,
    pub school_context: SchoolContextService,
}

impl AppServices {
    pub fn new(config: AppConfig, stores: Stores) -> Self {
        let hasher = PasswordHasher::new(config.bcrypt_cost);
        let tokens = TokenService::new(config.token_config());
        let sessions = SessionService::new(stores.users.clone(), tokens, hasher, config.lockout);
        let iam = IamService::new(stores.users.clone(), stores.grants.clone(), stores.catalog.clone());
        let school_admins = SchoolAdminService::new(
            stores.users.clone(),
            stores.schools.clone(),
            stores.grants.clone(),
            stores.catalog.clone(),
        );
        let school_context = SchoolContextService::new(
            stores.users.clone(),
            stores.schools.clone(),
            stores.grants.clone(),
        );

        Self {
            config,
            stores,
            hasher,
            sessions,
            iam,
            school_admins,
            school_context,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        self.sessions.tokens()
    }
}

/// Build the services and run startup seeding (catalog, bootstrap admin).
pub async fn build_services(config: AppConfig, stores: Stores) -> Result<AppServices, StartupError> {
    let services = AppServices::new(config, stores);

    let seeded = services.iam.seed_default_catalog(Utc::now()).await?;
    info!(event = "permission_catalog_seeded", inserted = seeded);

    if let Some(admin) = services.config.bootstrap_admin.clone() {
        bootstrap_super_admin(&services, &admin).await?;
    }
    Ok(services)
}

async fn bootstrap_super_admin(services: &AppServices, admin: &BootstrapAdmin) -> Result<(), StartupError> {
    if services.stores.users.find_by_email(&admin.email).await?.is_some() {
        return Ok(());
    }

    let now = Utc::now();
    let hash = services.hasher.hash_blocking(admin.password.clone()).await?;
    let mut user = User::new(&admin.email, vec![Role::SuperAdmin], None, now)?.with_password_hash(hash);
    user.is_email_verified = true;

    let user_id = user.id;
    services.stores.users.insert(user).await?;
    info!(event = "super_admin_bootstrapped", %user_id);
    Ok(())
}

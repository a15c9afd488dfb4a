//! Session authentication: login, silent refresh, logout.
//!
//! `authenticate` never fails. Every problem on the token path collapses to
//! [`AuthResult::Anonymous`] and the decision to reject is left to guards.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use academia_auth::{FailedLogin, LockoutPolicy, TokenKind, User};
use academia_core::UserId;

use crate::password::{refresh_token_digest, PasswordError, PasswordHasher};
use crate::stores::{StoreError, UserStore};
use crate::token::{TokenError, TokenPair, TokenService};

#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown email, no password on file, or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("account is not active")]
    InactiveAccount,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of per-request authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated(User),
    Anonymous,
}

impl AuthResult {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthResult::Authenticated(user) => Some(user),
            AuthResult::Anonymous => None,
        }
    }
}

/// [`AuthResult`] plus the new token pair when the refresh path rotated one.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub result: AuthResult,
    pub rotated: Option<TokenPair>,
}

impl AuthOutcome {
    fn anonymous() -> Self {
        Self {
            result: AuthResult::Anonymous,
            rotated: None,
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    hasher: PasswordHasher,
    lockout: LockoutPolicy,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        hasher: PasswordHasher,
        lockout: LockoutPolicy,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            lockout,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Resolve the caller from the session cookies.
    ///
    /// A valid access token wins. Otherwise, when a refresh token is present,
    /// a rotation is attempted and the new pair is returned for the caller to
    /// set as cookies.
    #[instrument(skip_all)]
    pub async fn authenticate(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> AuthOutcome {
        if let Some(token) = access_token {
            match self.tokens.verify(token, TokenKind::Access, now) {
                Ok(claims) => {
                    return match self.load_active(claims.sub).await {
                        Some(user) => AuthOutcome {
                            result: AuthResult::Authenticated(user),
                            rotated: None,
                        },
                        None => AuthOutcome::anonymous(),
                    };
                }
                Err(err) => {
                    tracing::debug!(event = "access_token_rejected", error = %err);
                }
            }
        }

        let Some(refresh) = refresh_token else {
            return AuthOutcome::anonymous();
        };

        match self.refresh(refresh, now).await {
            Ok((user, pair)) => AuthOutcome {
                result: AuthResult::Authenticated(user),
                rotated: Some(pair),
            },
            Err(err) => {
                warn!(event = "silent_refresh_failed", error = %err);
                AuthOutcome::anonymous()
            }
        }
    }

    async fn load_active(&self, user_id: UserId) -> Option<User> {
        match self.users.get(user_id).await {
            Ok(Some(user)) if user.is_active() => Some(user),
            Ok(_) => None,
            Err(err) => {
                warn!(event = "session_user_lookup_failed", user_id = %user_id, error = %err);
                None
            }
        }
    }

    /// Rotate a refresh token: verify, match the stored hash, mint a new pair.
    ///
    /// After success the previous refresh token no longer validates.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, TokenPair), SessionError> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh, now)?;

        let mut user = self
            .users
            .get(claims.sub)
            .await?
            .ok_or(SessionError::InvalidRefreshToken)?;
        if !user.is_active() {
            return Err(SessionError::InactiveAccount);
        }

        let stored = user
            .live_refresh_token_hash(now)
            .ok_or(SessionError::InvalidRefreshToken)?
            .to_string();
        let digest = refresh_token_digest(refresh_token);
        if !self.hasher.verify_blocking(digest, stored).await {
            return Err(SessionError::InvalidRefreshToken);
        }

        let pair = self.issue_and_store(&mut user, now).await?;
        info!(event = "refresh_token_rotated", user_id = %user.id);
        Ok((user, pair))
    }

    /// Password login with attempt counting and temporary lockout.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, TokenPair), SessionError> {
        let mut user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(SessionError::InvalidCredentials)?;

        if let Some(until) = user.lockout_until.filter(|until| *until > now) {
            warn!(event = "login_while_locked", user_id = %user.id);
            return Err(SessionError::AccountLocked { until });
        }

        let Some(hash) = user.password_hash.clone() else {
            return Err(SessionError::InvalidCredentials);
        };

        if !self.hasher.verify_blocking(password.to_string(), hash).await {
            let outcome = user.record_failed_login(now, self.lockout);
            self.users.update(&user).await?;
            return match outcome {
                FailedLogin::Counted { remaining } => {
                    warn!(event = "login_failed", user_id = %user.id, remaining);
                    Err(SessionError::InvalidCredentials)
                }
                FailedLogin::LockedOut { until } => {
                    warn!(event = "account_locked", user_id = %user.id, %until);
                    Err(SessionError::AccountLocked { until })
                }
            };
        }

        if !user.is_active() {
            return Err(SessionError::InactiveAccount);
        }

        user.record_successful_login(now);
        let pair = self.issue_and_store(&mut user, now).await?;
        info!(event = "login_succeeded", user_id = %user.id);
        Ok((user, pair))
    }

    /// Drop the stored refresh token so no rotation can follow.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn logout(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), SessionError> {
        if let Some(mut user) = self.users.get(user_id).await? {
            user.clear_refresh_token(now);
            self.users.update(&user).await?;
        }
        Ok(())
    }

    async fn issue_and_store(
        &self,
        user: &mut User,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, SessionError> {
        let pair = self.tokens.issue_pair(user, now)?;
        let digest = refresh_token_digest(&pair.refresh_token);
        let hash = self.hasher.hash_blocking(digest).await?;
        user.set_refresh_token(hash, pair.refresh_expires_at, now);
        self.users.update(user).await?;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryStores;
    use crate::token::TokenConfig;
    use academia_auth::{Role, UserStatus};
    use chrono::Duration;

    const PASSWORD: &str = "s3cret-pass";

    struct Fixture {
        users: Arc<InMemoryStores>,
        service: SessionService,
        hasher: PasswordHasher,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryStores::new());
        let hasher = PasswordHasher::new(4);
        let service = SessionService::new(
            users.clone(),
            TokenService::new(TokenConfig::with_secret("session-test-secret-0123456789ab")),
            hasher,
            LockoutPolicy {
                max_attempts: 3,
                lockout: Duration::minutes(15),
            },
        );
        Fixture {
            users,
            service,
            hasher,
        }
    }

    async fn seed_user(f: &Fixture) -> User {
        let user = User::new("admin@school.org", vec![Role::SchoolAdmin], None, Utc::now())
            .unwrap()
            .with_password_hash(f.hasher.hash(PASSWORD).unwrap());
        UserStore::insert(f.users.as_ref(), user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn login_issues_tokens_and_persists_refresh_hash() {
        let f = fixture();
        let user = seed_user(&f).await;

        let (logged_in, pair) = f.service.login("ADMIN@school.org", PASSWORD, Utc::now()).await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let stored = UserStore::get(f.users.as_ref(), user.id).await.unwrap().unwrap();
        assert!(stored.last_login_at.is_some());
        let hash = stored.refresh_token_hash.unwrap();
        assert!(f.hasher.verify_refresh_token(&pair.refresh_token, &hash));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let f = fixture();
        seed_user(&f).await;

        let unknown = f.service.login("nobody@school.org", PASSWORD, Utc::now()).await;
        let wrong = f.service.login("admin@school.org", "nope", Utc::now()).await;
        assert!(matches!(unknown, Err(SessionError::InvalidCredentials)));
        assert!(matches!(wrong, Err(SessionError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_account() {
        let f = fixture();
        let user = seed_user(&f).await;
        let now = Utc::now();

        for _ in 0..2 {
            let err = f.service.login("admin@school.org", "bad", now).await.unwrap_err();
            assert!(matches!(err, SessionError::InvalidCredentials));
        }
        let err = f.service.login("admin@school.org", "bad", now).await.unwrap_err();
        assert!(matches!(err, SessionError::AccountLocked { .. }));

        // Even the right password is refused while locked.
        let err = f.service.login("admin@school.org", PASSWORD, now).await.unwrap_err();
        assert!(matches!(err, SessionError::AccountLocked { .. }));

        // After the window it works again and clears the lock.
        let later = now + Duration::minutes(16);
        f.service.login("admin@school.org", PASSWORD, later).await.unwrap();
        let stored = UserStore::get(f.users.as_ref(), user.id).await.unwrap().unwrap();
        assert!(stored.lockout_until.is_none());
        assert_eq!(stored.login_attempts, 0);
    }

    #[tokio::test]
    async fn inactive_user_cannot_log_in() {
        let f = fixture();
        let mut user = seed_user(&f).await;
        user.change_status(UserStatus::Suspended, Utc::now()).unwrap();
        UserStore::update(f.users.as_ref(), &user).await.unwrap();

        let err = f.service.login("admin@school.org", PASSWORD, Utc::now()).await.unwrap_err();
        assert!(matches!(err, SessionError::InactiveAccount));
    }

    #[tokio::test]
    async fn valid_access_token_authenticates_without_rotation() {
        let f = fixture();
        let user = seed_user(&f).await;
        let (_, pair) = f.service.login("admin@school.org", PASSWORD, Utc::now()).await.unwrap();

        let outcome = f
            .service
            .authenticate(Some(&pair.access_token), Some(&pair.refresh_token), Utc::now())
            .await;
        assert_eq!(outcome.result.user().map(|u| u.id), Some(user.id));
        assert!(outcome.rotated.is_none());
    }

    #[tokio::test]
    async fn expired_access_token_is_silently_refreshed() {
        let f = fixture();
        let user = seed_user(&f).await;
        let issued = Utc::now() - Duration::hours(25);
        let (_, old) = f.service.login("admin@school.org", PASSWORD, issued).await.unwrap();

        let outcome = f
            .service
            .authenticate(Some(&old.access_token), Some(&old.refresh_token), Utc::now())
            .await;
        let new = outcome.rotated.expect("pair rotated");
        assert_eq!(outcome.result.user().map(|u| u.id), Some(user.id));

        let claims = f
            .service
            .tokens()
            .verify(&new.access_token, TokenKind::Access, Utc::now())
            .unwrap();
        assert_eq!(claims.sub, user.id);

        // The old refresh token no longer matches the stored hash.
        let stored = UserStore::get(f.users.as_ref(), user.id).await.unwrap().unwrap();
        let hash = stored.refresh_token_hash.unwrap();
        assert!(!f.hasher.verify_refresh_token(&old.refresh_token, &hash));
        assert!(f.hasher.verify_refresh_token(&new.refresh_token, &hash));

        let replay = f.service.refresh(&old.refresh_token, Utc::now()).await;
        assert!(matches!(replay, Err(SessionError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn garbage_cookies_yield_anonymous() {
        let f = fixture();
        seed_user(&f).await;

        let outcome = f.service.authenticate(Some("garbage"), Some("also-garbage"), Utc::now()).await;
        assert_eq!(outcome.result, AuthResult::Anonymous);
        assert!(outcome.rotated.is_none());

        let none = f.service.authenticate(None, None, Utc::now()).await;
        assert_eq!(none.result, AuthResult::Anonymous);
    }

    #[tokio::test]
    async fn logout_prevents_refresh() {
        let f = fixture();
        let user = seed_user(&f).await;
        let (_, pair) = f.service.login("admin@school.org", PASSWORD, Utc::now()).await.unwrap();

        f.service.logout(user.id, Utc::now()).await.unwrap();
        let err = f.service.refresh(&pair.refresh_token, Utc::now()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn inactive_user_with_valid_access_token_is_anonymous() {
        let f = fixture();
        let user = seed_user(&f).await;
        let (_, pair) = f.service.login("admin@school.org", PASSWORD, Utc::now()).await.unwrap();

        let mut stored = UserStore::get(f.users.as_ref(), user.id).await.unwrap().unwrap();
        stored.change_status(UserStatus::Inactive, Utc::now()).unwrap();
        UserStore::update(f.users.as_ref(), &stored).await.unwrap();

        let outcome = f.service.authenticate(Some(&pair.access_token), None, Utc::now()).await;
        assert_eq!(outcome.result, AuthResult::Anonymous);
    }
}

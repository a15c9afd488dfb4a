//! HS256 access/refresh token issuing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use academia_auth::{validate_claims, Role, TokenClaims, TokenKind, TokenValidationError, User};

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    /// Same secret for both kinds, default lifetimes (24h / 7d).
    pub fn with_secret(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self {
            access_secret: secret.clone(),
            refresh_secret: secret,
            access_ttl: Duration::hours(24),
            refresh_ttl: Duration::days(7),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, malformed token, undecodable claims.
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Claims(TokenValidationError::Expired))
    }
}

/// A freshly minted access + refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.config.access_ttl)
            .field("refresh_ttl", &self.config.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            config,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.config.refresh_ttl
    }

    /// Build claims for `user` without signing them.
    pub fn claims_for(&self, user: &User, kind: TokenKind, now: DateTime<Utc>) -> TokenClaims {
        let ttl = match kind {
            TokenKind::Access => self.config.access_ttl,
            TokenKind::Refresh => self.config.refresh_ttl,
        };
        TokenClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.primary_role().unwrap_or(Role::Student),
            school_id: user.school_id,
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        let key = match claims.kind {
            TokenKind::Access => &self.access_encoding,
            TokenKind::Refresh => &self.refresh_encoding,
        };
        encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn issue_pair(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        let access = self.claims_for(user, TokenKind::Access, now);
        let refresh = self.claims_for(user, TokenKind::Refresh, now);

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            access_expires_at: access.expires_at(),
            refresh_expires_at: refresh.expires_at(),
        })
    }

    /// Verify signature and decode, then check kind and time window at `now`.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let key = match expected {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        // Time checks run against the injected clock below.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, key, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        validate_claims(&data.claims, expected, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academia_core::SchoolId;

    fn service() -> TokenService {
        let mut config = TokenConfig::with_secret("access-secret-for-tests-0123456789");
        config.refresh_secret = "refresh-secret-for-tests-0123456789".into();
        TokenService::new(config)
    }

    fn user() -> User {
        User::new("teacher@school.org", vec![Role::Teacher], Some(SchoolId::new()), Utc::now())
            .unwrap()
    }

    #[test]
    fn issued_pair_verifies_with_matching_kind() {
        let svc = service();
        let u = user();
        let now = Utc::now();
        let pair = svc.issue_pair(&u, now).unwrap();

        let access = svc.verify(&pair.access_token, TokenKind::Access, now).unwrap();
        assert_eq!(access.sub, u.id);
        assert_eq!(access.role, Role::Teacher);
        assert_eq!(access.school_id, u.school_id);

        let refresh = svc.verify(&pair.refresh_token, TokenKind::Refresh, now).unwrap();
        assert_eq!(refresh.sub, u.id);
        assert!(pair.refresh_expires_at > pair.access_expires_at);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let svc = service();
        let pair = svc.issue_pair(&user(), Utc::now()).unwrap();
        // Different secret, so the signature check fails first.
        assert!(matches!(
            svc.verify(&pair.refresh_token, TokenKind::Access, Utc::now()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn wrong_kind_is_rejected_with_shared_secret() {
        let svc = TokenService::new(TokenConfig::with_secret("one-secret-for-both-kinds-000000"));
        let pair = svc.issue_pair(&user(), Utc::now()).unwrap();
        let err = svc
            .verify(&pair.refresh_token, TokenKind::Access, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenError::Claims(TokenValidationError::WrongKind { .. })));
    }

    #[test]
    fn expired_access_token_reports_expiry() {
        let svc = service();
        let issued = Utc::now() - Duration::days(2);
        let pair = svc.issue_pair(&user(), issued).unwrap();
        let err = svc
            .verify(&pair.access_token, TokenKind::Access, Utc::now())
            .unwrap_err();
        assert!(err.is_expired());
    }

    #[test]
    fn tampered_token_is_invalid() {
        let svc = service();
        let pair = svc.issue_pair(&user(), Utc::now()).unwrap();
        let mut tampered = pair.access_token.clone();
        tampered.push('x');
        assert!(matches!(
            svc.verify(&tampered, TokenKind::Access, Utc::now()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn tokens_minted_in_the_same_second_differ() {
        let svc = service();
        let u = user();
        let now = Utc::now();
        let a = svc.issue_pair(&u, now).unwrap();
        let b = svc.issue_pair(&u, now).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
    }
}

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use academia_core::{SchoolId, UserId};

use crate::Role;

/// Which of the two session tokens a set of claims belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims model (transport-agnostic).
///
/// Timestamps are Unix seconds so the encoded form stays compatible with
/// standard JWT validators (`exp`, `iat`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id.
    pub sub: UserId,

    pub email: String,

    /// Primary role of the subject at issue time.
    pub role: Role,

    /// Home school of the subject, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<SchoolId>,

    #[serde(rename = "typ")]
    pub kind: TokenKind,

    /// Unique token id; two tokens minted in the same second still differ.
    pub jti: String,

    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("expected a {expected:?} token, got {actual:?}")]
    WrongKind { expected: TokenKind, actual: TokenKind },
}

impl TokenClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Deterministically validate token claims.
///
/// Note: this validates the *claims* only. Signature verification / decoding
/// happens in the token service.
pub fn validate_claims(
    claims: &TokenClaims,
    expected: TokenKind,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.kind != expected {
        return Err(TokenValidationError::WrongKind {
            expected,
            actual: claims.kind,
        });
    }
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now.timestamp() < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(kind: TokenKind, iat: DateTime<Utc>, ttl: Duration) -> TokenClaims {
        TokenClaims {
            sub: UserId::new(),
            email: "ada@example.com".into(),
            role: Role::Teacher,
            school_id: Some(SchoolId::new()),
            kind,
            jti: "jti-1".into(),
            iat: iat.timestamp(),
            exp: (iat + ttl).timestamp(),
        }
    }

    #[test]
    fn accepts_live_token_of_expected_kind() {
        let now = Utc::now();
        let c = claims(TokenKind::Access, now, Duration::hours(1));
        assert_eq!(validate_claims(&c, TokenKind::Access, now), Ok(()));
    }

    #[test]
    fn rejects_kind_confusion() {
        let now = Utc::now();
        let c = claims(TokenKind::Refresh, now, Duration::hours(1));
        assert!(matches!(
            validate_claims(&c, TokenKind::Access, now),
            Err(TokenValidationError::WrongKind { .. })
        ));
    }

    #[test]
    fn rejects_expired_and_future_tokens() {
        let now = Utc::now();
        let old = claims(TokenKind::Access, now - Duration::hours(2), Duration::hours(1));
        assert_eq!(
            validate_claims(&old, TokenKind::Access, now),
            Err(TokenValidationError::Expired)
        );

        let future = claims(TokenKind::Access, now + Duration::hours(2), Duration::hours(1));
        assert_eq!(
            validate_claims(&future, TokenKind::Access, now),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let c = claims(TokenKind::Access, now, Duration::hours(-1));
        assert_eq!(
            validate_claims(&c, TokenKind::Access, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn school_id_is_omitted_when_absent() {
        let mut c = claims(TokenKind::Access, Utc::now(), Duration::hours(1));
        c.school_id = None;
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("school_id").is_none());
        assert_eq!(json["typ"], "access");
    }
}

//! Password and refresh-token hashing.
//!
//! Passwords are bcrypt-hashed directly. Refresh tokens are first reduced
//! to a SHA-256 hex digest: bcrypt reads only 72 input bytes, and two JWTs
//! of the same user share a longer prefix than that.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// bcrypt hasher with a fixed work factor.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher {
    /// `cost` is clamped to bcrypt's accepted range (4..=31).
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(secret, self.cost)?)
    }

    /// `false` for a malformed stored hash as well as for a mismatch.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        bcrypt::verify(secret, hash).unwrap_or(false)
    }

    pub fn hash_refresh_token(&self, token: &str) -> Result<String, PasswordError> {
        self.hash(&refresh_token_digest(token))
    }

    pub fn verify_refresh_token(&self, token: &str, hash: &str) -> bool {
        self.verify(&refresh_token_digest(token), hash)
    }

    /// Hash on the blocking pool; bcrypt is deliberately slow.
    pub async fn hash_blocking(&self, secret: String) -> Result<String, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    pub async fn verify_blocking(&self, secret: String, hash: String) -> bool {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
            .await
            .unwrap_or(false)
    }
}

/// Hex SHA-256 of a refresh token, the bcrypt input for stored refresh hashes.
pub fn refresh_token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

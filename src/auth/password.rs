use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Salted password hashing, injected into the auth and user services.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, HashError>;
    /// `Ok(false)` on mismatch; `Err` only when `hash` is not a usable hash.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError>;
}

/// bcrypt with a configurable cost.
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        BcryptHasher { cost }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, HashError> {
        bcrypt::hash(password, self.cost).map_err(|e| HashError(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError> {
        bcrypt::verify(password, hash).map_err(|e| HashError(e.to_string()))
    }
}

/// Hashes on the blocking pool so a slow cost factor never stalls the runtime.
pub async fn hash_blocking(
    hasher: Arc<dyn PasswordHasher>,
    password: String,
) -> Result<String, HashError> {
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| HashError(e.to_string()))?
}

pub async fn verify_blocking(
    hasher: Arc<dyn PasswordHasher>,
    password: String,
    hash: String,
) -> Result<bool, HashError> {
    tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
        .await
        .map_err(|e| HashError(e.to_string()))?
}

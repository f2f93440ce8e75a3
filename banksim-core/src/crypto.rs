//! PIN hashing
//!
//! PINs are stored as Argon2id PHC strings and verified with the
//! constant-time comparison in `PasswordVerifier`. Hashing is CPU bound, so
//! async callers go through [`PinHasher::hash_async`] / [`PinHasher::verify_async`]
//! which run on the blocking pool.

use crate::config::SecurityConfig;
use crate::{Error, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};

/// Argon2id hasher for customer PINs
#[derive(Clone)]
pub struct PinHasher {
    argon2: Argon2<'static>,
    /// Hash checked when the customer is unknown, so misses cost the same
    dummy_hash: String,
}

impl std::fmt::Debug for PinHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinHasher").finish_non_exhaustive()
    }
}

impl PinHasher {
    /// Build a hasher with the configured cost
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.pin_hash_memory_kib,
            config.pin_hash_iterations,
            config.pin_hash_parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("Invalid Argon2 parameters: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut hasher = Self {
            argon2,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash("000000")?;
        Ok(hasher)
    }

    /// Hash a PIN with a fresh random salt
    pub fn hash(&self, pin: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(pin.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::Internal(format!("PIN hashing failed: {}", e)))
    }

    /// Verify a PIN against a stored hash; malformed hashes never verify
    pub fn verify(&self, pin: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self.argon2.verify_password(pin.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Verify against `stored_hash`, or burn the same work when there is none
    pub fn verify_or_dummy(&self, pin: &str, stored_hash: Option<&str>) -> bool {
        match stored_hash {
            Some(hash) => self.verify(pin, hash),
            None => {
                let _ = self.verify(pin, &self.dummy_hash);
                false
            }
        }
    }

    /// [`PinHasher::hash`] on the blocking pool
    pub async fn hash_async(&self, pin: String) -> Result<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&pin))
            .await
            .map_err(|e| Error::Concurrency(format!("PIN hashing task failed: {}", e)))?
    }

    /// [`PinHasher::verify_or_dummy`] on the blocking pool
    pub async fn verify_async(&self, pin: String, stored_hash: Option<String>) -> Result<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_or_dummy(&pin, stored_hash.as_deref()))
            .await
            .map_err(|e| Error::Concurrency(format!("PIN verification task failed: {}", e)))
    }
}

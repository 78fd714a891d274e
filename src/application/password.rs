//! Password hashing with Argon2id over a random per-user salt.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

const SALT_LEN: usize = 16;

/// Errors that can occur while hashing a password.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("failed to hash password: {0}")]
    HashError(String),
}

/// Hash/verify collaborator used by account creation and login.
pub trait PasswordHasher: Send + Sync {
    /// Returns `(hash, salt)`.
    fn hash(&self, password: &str) -> Result<(Vec<u8>, Vec<u8>), PasswordError>;

    fn verify(&self, password: &str, hash: &[u8], salt: &[u8]) -> bool;
}

/// Argon2id with explicit parameters, raw hash and salt stored separately.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
    key_len: usize,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            memory_kib: 32 * 1024,
            iterations: 3,
            parallelism: 8,
            key_len: 32,
        }
    }
}

impl Argon2Hasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32, key_len: usize) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
            key_len,
        }
    }

    /// Cheap parameters for tests and local tooling.
    pub fn fast() -> Self {
        Self::new(1024, 1, 1, 32)
    }

    fn derive(&self, password: &str, salt: &[u8]) -> Result<Vec<u8>, PasswordError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.key_len),
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;

        let mut out = vec![0u8; self.key_len];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password.as_bytes(), salt, &mut out)
            .map_err(|e| PasswordError::HashError(e.to_string()))?;
        Ok(out)
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<(Vec<u8>, Vec<u8>), PasswordError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let hash = self.derive(password, &salt)?;
        Ok((hash, salt))
    }

    fn verify(&self, password: &str, hash: &[u8], salt: &[u8]) -> bool {
        match self.derive(password, salt) {
            Ok(candidate) => constant_time_eq(&candidate, hash),
            Err(_) => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

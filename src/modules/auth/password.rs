use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

use super::error::AuthError;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Password rule violations
#[derive(Debug, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("Please provide a password")]
    Blank,

    #[error("Password must be at least {0} characters")]
    TooShort(usize),

    #[error("Password must be at most {0} characters")]
    TooLong(usize),

    #[error("Passwords are not the same")]
    Mismatch,
}

/// Length bounds only
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl PasswordPolicy {
    pub fn validate(&self, password: &str, confirm: &str) -> Result<(), PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Blank);
        }
        let length = password.chars().count();
        if length < self.min_length {
            return Err(PasswordError::TooShort(self.min_length));
        }
        if length > self.max_length {
            return Err(PasswordError::TooLong(self.max_length));
        }
        if password != confirm {
            return Err(PasswordError::Mismatch);
        }
        Ok(())
    }
}

/// Encoded `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`.
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn from_encoded(encoded: String) -> Self {
        Self(encoded)
    }

    fn parts(&self) -> Option<(u32, Vec<u8>, Vec<u8>)> {
        let mut parts = self.0.split('$');
        if parts.next()? != SCHEME {
            return None;
        }
        let iterations = parts.next()?.parse().ok()?;
        let salt = hex::decode(parts.next()?).ok()?;
        let hash = hex::decode(parts.next()?).ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((iterations, salt, hash))
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut key);
    key
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hash with a fresh random salt. Slow; call from a blocking
/// context.
pub fn hash_password(password: &str, iterations: u32) -> PasswordHash {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_key(password, &salt, iterations);
    PasswordHash(format!(
        "{}${}${}${}",
        SCHEME,
        iterations,
        hex::encode(salt),
        hex::encode(key)
    ))
}

/// A malformed stored hash never verifies
pub fn verify_password(password: &str, hash: &PasswordHash) -> bool {
    match hash.parts() {
        Some((iterations, salt, expected)) => {
            constant_time_eq(&derive_key(password, &salt, iterations), &expected)
        }
        None => false,
    }
}

/// Async front for the slow hashing work; runs on the blocking pool so
/// it never stalls other requests on the runtime.
#[derive(Clone)]
pub struct PasswordHasher {
    iterations: u32,
    decoy: PasswordHash,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        let mut seed = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut seed);
        Self {
            iterations,
            decoy: hash_password(&hex::encode(seed), iterations),
        }
    }

    pub async fn hash(&self, password: &str) -> Result<PasswordHash, AuthError> {
        let password = password.to_owned();
        let iterations = self.iterations;
        tokio::task::spawn_blocking(move || hash_password(&password, iterations))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {}", e)))
    }

    pub async fn verify(&self, password: &str, hash: &PasswordHash) -> Result<bool, AuthError> {
        let password = password.to_owned();
        let hash = hash.clone();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {}", e)))
    }

    /// Spend the same effort as a real verification. Keeps "no such
    /// account" as slow as "wrong password".
    pub async fn verify_decoy(&self, password: &str) -> Result<(), AuthError> {
        self.verify(password, &self.decoy).await.map(|_| ())
    }
}

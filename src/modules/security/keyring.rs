use keyring::Entry;
use rand::RngCore;
use thiserror::Error;

use crate::KEYRING_SERVICE;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("keyring unavailable: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("stored secret is malformed")]
    Malformed,
}

/// Access and refresh signing secrets. They must differ.
#[derive(Clone)]
pub struct SigningSecrets {
    pub access: String,
    pub refresh: String,
}

impl std::fmt::Debug for SigningSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecrets(<redacted>)")
    }
}

/// Generate a new 32-byte random secret, hex encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Signing secrets kept in the system keyring
pub struct SecretVault {
    access: Entry,
    refresh: Entry,
}

impl SecretVault {
    pub fn new() -> Result<Self, VaultError> {
        Ok(Self {
            access: Entry::new(KEYRING_SERVICE, "jwt-access-secret")?,
            refresh: Entry::new(KEYRING_SERVICE, "jwt-refresh-secret")?,
        })
    }

    /// Generate and store both secrets unless they already exist.
    /// Returns whether new secrets were written.
    pub fn initialize_if_needed(&self) -> Result<bool, VaultError> {
        if self.access.get_password().is_ok() && self.refresh.get_password().is_ok() {
            return Ok(false);
        }

        // Both are always written together
        self.access.set_password(&generate_secret())?;
        self.refresh.set_password(&generate_secret())?;
        log::info!("New signing secrets generated and stored in system keyring");
        Ok(true)
    }

    pub fn load(&self) -> Result<SigningSecrets, VaultError> {
        let access = self.access.get_password()?;
        let refresh = self.refresh.get_password()?;
        if !is_secret(&access) || !is_secret(&refresh) || access == refresh {
            return Err(VaultError::Malformed);
        }
        Ok(SigningSecrets { access, refresh })
    }
}

fn is_secret(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

mod keyring;

pub use self::keyring::{generate_secret, SecretVault, SigningSecrets, VaultError};

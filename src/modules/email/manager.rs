use keyring::Entry;

use super::notifier::NotifyError;
use super::smtp::SmtpCredentials;
use crate::KEYRING_SERVICE;

/// SMTP credentials kept in the system keyring
pub struct SecureEmailManager {
    keyring: Entry,
}

impl SecureEmailManager {
    pub fn new() -> Result<Self, NotifyError> {
        let keyring = Entry::new(KEYRING_SERVICE, "smtp-credentials")
            .map_err(|e| NotifyError::Credentials(e.to_string()))?;
        Ok(Self { keyring })
    }

    /// Store new SMTP credentials in the system keyring
    pub fn store_credentials(
        &self,
        username: &str,
        password: &str,
        host: &str,
        port: u16,
    ) -> Result<(), NotifyError> {
        let credentials = SmtpCredentials {
            username: username.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            port,
            last_updated: chrono::Utc::now().timestamp(),
        };

        let creds_json = serde_json::to_string(&credentials)
            .map_err(|e| NotifyError::Credentials(format!("failed to serialize: {}", e)))?;

        self.keyring
            .set_password(&creds_json)
            .map_err(|e| NotifyError::Credentials(format!("failed to store: {}", e)))
    }

    pub fn get_credentials(&self) -> Result<SmtpCredentials, NotifyError> {
        let creds_json = self
            .keyring
            .get_password()
            .map_err(|e| NotifyError::Credentials(format!("failed to retrieve: {}", e)))?;

        serde_json::from_str(&creds_json)
            .map_err(|e| NotifyError::Credentials(format!("failed to parse: {}", e)))
    }
}

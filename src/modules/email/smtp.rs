use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};

use super::manager::SecureEmailManager;
use super::notifier::{NotificationPayload, Notifier, NotifyError, TemplateKind};
use super::templates::render;
use crate::auth::AccountProfile;

/// Structure to hold SMTP credentials with metadata
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpCredentials {
    // The email address/username for SMTP authentication
    pub username: String,
    // The password or app-specific password for SMTP
    pub password: String,
    // SMTP server hostname (e.g., smtp.gmail.com)
    pub host: String,
    // SMTP server port (typically 587 for TLS)
    pub port: u16,
    // When these credentials were last updated
    pub last_updated: i64,
}

/// Delivers notifications over SMTP with TLS
#[derive(Clone)]
pub struct SmtpNotifier {
    credentials: SmtpCredentials,
    sender_name: String,
}

impl SmtpNotifier {
    pub fn new(credentials: SmtpCredentials, sender_name: impl Into<String>) -> Self {
        Self {
            credentials,
            sender_name: sender_name.into(),
        }
    }

    /// Use the credentials stored by `trailpass setup-email`
    pub fn from_keyring(sender_name: impl Into<String>) -> Result<Self, NotifyError> {
        let credentials = SecureEmailManager::new()?.get_credentials()?;
        Ok(Self::new(credentials, sender_name))
    }

    pub fn sender(&self) -> String {
        format!("{} <{}>", self.sender_name, self.credentials.username)
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
        Message::builder()
            .from(
                self.sender()
                    .parse()
                    .map_err(|e| NotifyError::Address(format!("from: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotifyError::Address(format!("to: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Delivery(format!("failed to build email: {}", e)))
    }

    /// Blocking send; run it off the async runtime
    pub fn send_plain(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = self.build_message(to, subject, body)?;
        let creds = &self.credentials;

        let tls_parameters = TlsParameters::builder(creds.host.clone())
            .build()
            .map_err(|e| NotifyError::Delivery(format!("TLS parameters: {}", e)))?;

        let mailer = SmtpTransport::relay(&creds.host)
            .map_err(|e| NotifyError::Delivery(format!("SMTP transport: {}", e)))?
            .credentials(Credentials::new(
                creds.username.clone(),
                creds.password.clone(),
            ))
            .port(creds.port)
            .tls(Tls::Required(tls_parameters))
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();

        mailer
            .send(&email)
            .map(|_| ())
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        recipient: &AccountProfile,
        kind: TemplateKind,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        let email = render(kind, &recipient.name, payload);
        let to = recipient.email.clone();
        let notifier = self.clone();

        tokio::task::spawn_blocking(move || notifier.send_plain(&to, &email.subject, &email.body))
            .await
            .map_err(|e| NotifyError::Delivery(format!("send task failed: {}", e)))?
    }
}

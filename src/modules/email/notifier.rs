use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::auth::AccountProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    EmailConfirm,
    PasswordReset,
}

/// What the recipient needs to act on the message. `token` is the raw
/// secret, so `Debug` leaves it out.
#[derive(Clone)]
pub struct NotificationPayload {
    pub link: String,
    pub token: String,
    /// Seconds the token stays valid, when it expires at all
    pub valid_for: Option<u64>,
}

impl fmt::Debug for NotificationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationPayload")
            .field("valid_for", &self.valid_for)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("email credentials unavailable: {0}")]
    Credentials(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound email dispatch
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &AccountProfile,
        kind: TemplateKind,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;
}

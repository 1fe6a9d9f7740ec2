//! Core wiring for the credential subsystem.
//!
//! [`AuthService`] owns the collaborators and exposes the lifecycle
//! operations; they are implemented across `credentials`, `middleware`,
//! `recovery` and `verification`.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use super::error::AuthError;
use super::model::{Account, AccountProfile};
use super::password::{PasswordHasher, PasswordPolicy};
use super::session::SessionManager;
use super::store::{guarded, AccountStore, SessionStore, StoreError};
use super::tokens::TokenPair;
use crate::config::AuthConfig;
use crate::email::{NotificationPayload, Notifier, TemplateKind};
use crate::utils::{Clock, SystemClock};

/// An account that has just been handed a fresh token pair
#[derive(Debug, Clone, Serialize)]
pub struct SignedIn {
    pub account: AccountProfile,
    #[serde(skip)]
    pub tokens: TokenPair,
}

pub struct AuthService {
    pub(super) config: AuthConfig,
    pub(super) accounts: Arc<dyn AccountStore>,
    pub(super) sessions: SessionManager,
    pub(super) hasher: PasswordHasher,
    pub(super) policy: PasswordPolicy,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AuthError> {
        Self::with_clock(config, accounts, sessions, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AuthConfig,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        config
            .validate()
            .map_err(|e| AuthError::Internal(format!("invalid configuration: {}", e)))?;

        let sessions = SessionManager::new(&config, accounts.clone(), sessions, clock.clone());
        Ok(Self {
            hasher: PasswordHasher::new(config.pbkdf2_iterations),
            policy: PasswordPolicy {
                min_length: config.min_password_length,
                max_length: config.max_password_length,
            },
            config,
            accounts,
            sessions,
            notifier,
            clock,
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) async fn store<T, F>(&self, op: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        guarded(self.config.store_timeout(), op).await
    }

    /// Reload an account so that checks run against the stored state
    pub(super) async fn reload(&self, account: &Account) -> Result<Account, AuthError> {
        self.store(self.accounts.find_by_id(&account.id))
            .await?
            .ok_or(AuthError::AccountGone)
    }

    /// Send under the notifier deadline. A timeout counts as a failure.
    pub(super) async fn notify(
        &self,
        account: &Account,
        kind: TemplateKind,
        payload: NotificationPayload,
    ) -> Result<(), AuthError> {
        let profile = account.profile();
        let sent = tokio::time::timeout(
            self.config.notifier_timeout(),
            self.notifier.send(&profile, kind, &payload),
        )
        .await;

        let detail = match sent {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("notifier timed out after {:?}", self.config.notifier_timeout()),
        };
        log::error!("Failed to send {:?} to account {}: {}", kind, account.id, detail);
        Err(AuthError::Notification { detail })
    }

    pub(super) async fn sign_in(&self, account: &Account) -> Result<SignedIn, AuthError> {
        let tokens = self.sessions.create_session(account).await?;
        Ok(SignedIn {
            account: account.profile(),
            tokens,
        })
    }

    pub(super) fn link(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.config.public_base_url.trim_end_matches('/'),
            path_and_query
        )
    }
}

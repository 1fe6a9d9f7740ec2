//! Forgotten, reset and changed passwords.

use serde::Serialize;
use tokio::time::Instant;

use super::error::AuthError;
use super::model::Account;
use super::service::{AuthService, SignedIn};
use super::tokens::{digest_token, SecretToken};
use crate::email::{NotificationPayload, TemplateKind};
use crate::utils::{log_auth_event, normalize_email};
use crate::RESET_PATH;

const RESET_SENT: &str = "If an account with that email exists, a password reset link has been sent.";

/// Returned whether or not the email belongs to anyone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForgotPasswordAck {
    pub status: &'static str,
    pub message: &'static str,
}

impl Default for ForgotPasswordAck {
    fn default() -> Self {
        Self {
            status: "success",
            message: RESET_SENT,
        }
    }
}

impl AuthService {
    /// Start a password reset. Known and unknown emails get the same
    /// answer, no sooner than `forgot_password_floor` after the call.
    pub async fn forgot_password(&self, email: &str) -> Result<ForgotPasswordAck, AuthError> {
        let deadline = Instant::now() + self.config.forgot_password_floor();
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::Validation("Please provide an email".to_string()));
        }

        match self.store(self.accounts.find_by_email(&email)).await? {
            Some(account) => self.send_reset(account).await?,
            None => log_auth_event("forgot_password", &email, false, Some("unknown account")),
        }

        tokio::time::sleep_until(deadline).await;
        Ok(ForgotPasswordAck::default())
    }

    async fn send_reset(&self, account: Account) -> Result<(), AuthError> {
        let token = SecretToken::password_reset();
        let ttl = self.config.reset_token_ttl();
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Internal("reset expiry out of range".to_string()))?;
        let stored = self.accounts.set_password_reset(&account.id, token.digest(), expires_at);
        if !self.store(stored).await? {
            return Err(AuthError::AccountGone);
        }

        let payload = NotificationPayload {
            link: self.link(&format!("{}/{}", RESET_PATH, token.raw())),
            token: token.raw().to_string(),
            valid_for: u64::try_from(ttl.num_seconds()).ok(),
        };
        if let Err(err) = self.notify(&account, TemplateKind::PasswordReset, payload).await {
            // Only this request's token is withdrawn; anything written
            // since then stays
            let rollback = self.accounts.clear_password_reset_if(&account.id, token.digest());
            if let Err(rollback) = self.store(rollback).await {
                log::error!("Reset rollback failed for {}: {}", account.id, rollback);
            }
            log_auth_event("forgot_password", &account.email, false, Some("reset email not sent"));
            return Err(err);
        }

        log_auth_event("forgot_password", &account.email, true, None);
        Ok(())
    }

    /// Redeem an emailed reset token. Each token works once.
    pub async fn reset_password(
        &self,
        raw_token: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<SignedIn, AuthError> {
        self.policy.validate(password, password_confirm)?;

        let digest = digest_token(raw_token.trim());
        let account = self
            .store(self.accounts.claim_password_reset(&digest, self.clock.now()))
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let signed_in = self.replace_password(account, password).await?;
        log_auth_event("reset_password", &signed_in.account.email, true, None);
        Ok(signed_in)
    }

    /// Change the password of an authenticated account
    pub async fn update_password(
        &self,
        account: &Account,
        current_password: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<SignedIn, AuthError> {
        let account = self.reload(account).await?;
        if !self.hasher.verify(current_password, &account.password_hash).await? {
            log_auth_event("update_password", &account.email, false, Some("wrong password"));
            return Err(AuthError::InvalidCredentials);
        }
        self.policy.validate(password, password_confirm)?;

        let signed_in = self.replace_password(account, password).await?;
        log_auth_event("update_password", &signed_in.account.email, true, None);
        Ok(signed_in)
    }

    /// Shared tail of reset and update: every prior session dies and a
    /// new one is handed out.
    async fn replace_password(&self, account: Account, password: &str) -> Result<SignedIn, AuthError> {
        let hash = self.hasher.hash(password).await?;
        // Backdated so the token minted below is not already stale
        let changed_at = self.clock.now() - self.config.password_changed_margin();
        let account = self
            .store(self.accounts.set_password(&account.id, hash, changed_at))
            .await?
            .ok_or(AuthError::AccountGone)?;

        self.sessions.revoke_all_sessions(&account.id).await?;
        self.sign_in(&account).await
    }
}

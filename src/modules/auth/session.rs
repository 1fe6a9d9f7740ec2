use std::sync::Arc;
use std::time::Duration;

use super::error::AuthError;
use super::model::{Account, AccountId, Session};
use super::store::{guarded, AccountStore, SessionStore};
use super::tokens::{digest_token, TokenIssuer, TokenKind, TokenPair};
use crate::config::AuthConfig;
use crate::utils::Clock;

/// Creates, rotates and revokes refresh-token sessions
pub struct SessionManager {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    issuer: TokenIssuer,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        config: &AuthConfig,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            issuer: TokenIssuer::new(config),
            clock,
            store_timeout: config.store_timeout(),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Mint a pair and persist the session behind the refresh token
    pub async fn create_session(&self, account: &Account) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let (access_token, access) = self.issuer.issue(TokenKind::Access, &account.id, now)?;
        let (refresh_token, refresh) = self.issuer.issue(TokenKind::Refresh, &account.id, now)?;

        let session = Session::new(
            account.id.clone(),
            digest_token(&refresh_token),
            refresh.expires_at(),
            now,
        );
        guarded(self.store_timeout, self.sessions.create(session)).await?;
        log::debug!("Session created for account {}", account.id);

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at: access.expires_at(),
            refresh_expires_at: refresh.expires_at(),
        })
    }

    /// Exchange a refresh token for a new pair. The old session is deleted
    /// first and only a successful delete mints the successor, so every
    /// refresh token works at most once.
    pub async fn rotate_session(
        &self,
        refresh_token: &str,
    ) -> Result<(Account, TokenPair), AuthError> {
        let now = self.clock.now();
        let claims = self
            .issuer
            .verify(refresh_token, TokenKind::Refresh, now)
            .map_err(|e| match e {
                AuthError::Internal(_) => e,
                _ => AuthError::SessionInvalid,
            })?;

        let digest = digest_token(refresh_token);
        let Some(session) = guarded(self.store_timeout, self.sessions.take_live(&digest, now)).await?
        else {
            log::warn!("Refresh rejected for account {}: no live session", claims.sub);
            return Err(AuthError::SessionInvalid);
        };
        if session.account_id != claims.sub {
            return Err(AuthError::SessionInvalid);
        }

        let account = guarded(self.store_timeout, self.accounts.find_by_id(&claims.sub))
            .await?
            .ok_or(AuthError::AccountGone)?;
        let tokens = self.create_session(&account).await?;
        Ok((account, tokens))
    }

    /// Logout of one device. Returns whether a session was removed.
    pub async fn revoke_session(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let digest = digest_token(refresh_token);
        guarded(self.store_timeout, self.sessions.delete_one(&digest)).await
    }

    pub async fn revoke_all_sessions(&self, account_id: &AccountId) -> Result<usize, AuthError> {
        let removed = guarded(self.store_timeout, self.sessions.delete_many(account_id)).await?;
        log::info!("Revoked {} session(s) for account {}", removed, account_id);
        Ok(removed)
    }
}

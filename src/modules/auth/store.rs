//! Repository contracts for accounts and sessions, plus in-memory
//! implementations.
//!
//! All cross-request coordination happens here as atomic store
//! operations (`take_live`, `claim_password_reset`); callers never hold
//! locks of their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::error::AuthError;
use super::model::{Account, AccountId, Session};
use super::password::PasswordHash;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated on the named field
    #[error("duplicate value for {0}")]
    Conflict(&'static str),

    #[error("record not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Active accounts only
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    /// Active accounts only; `email` is already normalized
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Fails with `Conflict("email")` if the email is taken, including by
    /// an inactive account
    async fn create(&self, account: Account) -> Result<(), StoreError>;

    /// Store a pending reset for an active account. Returns false if the
    /// account is gone.
    async fn set_password_reset(
        &self,
        id: &AccountId,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Clear the pending reset only if it is still the one identified by
    /// `digest`
    async fn clear_password_reset_if(&self, id: &AccountId, digest: &str) -> Result<bool, StoreError>;

    /// Clear the verification digest only if it still equals `digest`
    async fn clear_verification_if(&self, id: &AccountId, digest: &str) -> Result<bool, StoreError>;

    /// Atomically mark the account verified if its verification digest
    /// equals `digest`, clearing the digest. Returns the updated account.
    async fn mark_verified_if(
        &self,
        id: &AccountId,
        digest: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Replace the password hash and stamp `password_changed_at`. Other
    /// fields are left untouched. Returns the updated account.
    async fn set_password(
        &self,
        id: &AccountId,
        hash: PasswordHash,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError>;

    /// Soft delete. Returns false if the account was not active.
    async fn deactivate(&self, id: &AccountId) -> Result<bool, StoreError>;

    /// Atomically find the active account whose reset digest matches and
    /// has not expired, clear its reset fields, and return it. At most one
    /// caller can claim a given digest.
    async fn claim_password_reset(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with `Conflict("token_digest")` on a duplicate digest
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    /// Expired sessions are never returned
    async fn find_live(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Delete the session if it exists and is unexpired, returning it.
    /// This is the gate for rotation: of two concurrent callers only one
    /// gets `Some`.
    async fn take_live(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    async fn delete_one(&self, digest: &str) -> Result<bool, StoreError>;

    async fn delete_many(&self, account_id: &AccountId) -> Result<usize, StoreError>;

    /// TTL sweep
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Run a store call under a deadline. Timeouts are non-operational.
pub(crate) async fn guarded<T, F>(limit: Duration, op: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result.map_err(AuthError::from),
        Err(_) => {
            log::error!("Store call exceeded {:?}", limit);
            Err(AuthError::Internal("store call timed out".to_string()))
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

fn active_mut<'a>(
    accounts: &'a mut HashMap<AccountId, Account>,
    id: &AccountId,
) -> Option<&'a mut Account> {
    accounts.get_mut(id).filter(|a| a.active)
}

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes inactive records
    pub fn len(&self) -> usize {
        lock(&self.accounts).map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        let accounts = lock(&self.accounts)?;
        Ok(accounts.get(id).filter(|a| a.active).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = lock(&self.accounts)?;
        Ok(accounts
            .values()
            .find(|a| a.active && a.email == email)
            .cloned())
    }

    async fn create(&self, account: Account) -> Result<(), StoreError> {
        let mut accounts = lock(&self.accounts)?;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict("email"));
        }
        if accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict("id"));
        }
        accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn set_password_reset(
        &self,
        id: &AccountId,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut accounts = lock(&self.accounts)?;
        Ok(match active_mut(&mut accounts, id) {
            Some(account) => {
                account.password_reset_token_digest = Some(digest.to_string());
                account.password_reset_expires_at = Some(expires_at);
                true
            }
            None => false,
        })
    }

    async fn clear_password_reset_if(&self, id: &AccountId, digest: &str) -> Result<bool, StoreError> {
        let mut accounts = lock(&self.accounts)?;
        Ok(match accounts.get_mut(id) {
            Some(account) if account.password_reset_token_digest.as_deref() == Some(digest) => {
                account.clear_password_reset();
                true
            }
            _ => false,
        })
    }

    async fn clear_verification_if(&self, id: &AccountId, digest: &str) -> Result<bool, StoreError> {
        let mut accounts = lock(&self.accounts)?;
        Ok(match accounts.get_mut(id) {
            Some(account) if account.verification_token_digest.as_deref() == Some(digest) => {
                account.verification_token_digest = None;
                true
            }
            _ => false,
        })
    }

    async fn mark_verified_if(
        &self,
        id: &AccountId,
        digest: &str,
    ) -> Result<Option<Account>, StoreError> {
        let mut accounts = lock(&self.accounts)?;
        Ok(match active_mut(&mut accounts, id) {
            Some(account)
                if !account.verified
                    && account.verification_token_digest.as_deref() == Some(digest) =>
            {
                account.verified = true;
                account.verification_token_digest = None;
                Some(account.clone())
            }
            _ => None,
        })
    }

    async fn set_password(
        &self,
        id: &AccountId,
        hash: PasswordHash,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError> {
        let mut accounts = lock(&self.accounts)?;
        Ok(active_mut(&mut accounts, id).map(|account| {
            account.password_hash = hash;
            account.password_changed_at = Some(changed_at);
            account.clone()
        }))
    }

    async fn deactivate(&self, id: &AccountId) -> Result<bool, StoreError> {
        let mut accounts = lock(&self.accounts)?;
        Ok(match active_mut(&mut accounts, id) {
            Some(account) => {
                account.active = false;
                true
            }
            None => false,
        })
    }

    async fn claim_password_reset(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError> {
        let mut accounts = lock(&self.accounts)?;
        let claimed = accounts.values_mut().find(|a| {
            a.active
                && a.password_reset_token_digest.as_deref() == Some(digest)
                && a.password_reset_expires_at.map_or(false, |at| at > now)
        });
        Ok(claimed.map(|account| {
            account.clear_password_reset();
            account.clone()
        }))
    }
}

/// Sessions keyed by token digest
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live sessions held by one account
    pub fn count_for(&self, account_id: &AccountId, now: DateTime<Utc>) -> usize {
        lock(&self.sessions)
            .map(|s| {
                s.values()
                    .filter(|s| &s.account_id == account_id && s.is_live(now))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = lock(&self.sessions)?;
        if sessions.contains_key(&session.token_digest) {
            return Err(StoreError::Conflict("token_digest"));
        }
        sessions.insert(session.token_digest.clone(), session);
        Ok(())
    }

    async fn find_live(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let sessions = lock(&self.sessions)?;
        Ok(sessions.get(digest).filter(|s| s.is_live(now)).cloned())
    }

    async fn take_live(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = lock(&self.sessions)?;
        match sessions.get(digest) {
            Some(session) if session.is_live(now) => Ok(sessions.remove(digest)),
            Some(_) => {
                // Expired entries are as good as gone
                sessions.remove(digest);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete_one(&self, digest: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.sessions)?.remove(digest).is_some())
    }

    async fn delete_many(&self, account_id: &AccountId) -> Result<usize, StoreError> {
        let mut sessions = lock(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, s| &s.account_id != account_id);
        Ok(before - sessions.len())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut sessions = lock(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live(now));
        Ok(before - sessions.len())
    }
}

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::password::PasswordHash;

fn random_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Opaque, stable account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(random_id())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

/// A durable account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Trimmed and lowercased
    pub email: String,
    pub password_hash: PasswordHash,
    pub role: Role,
    pub verified: bool,
    /// Soft-delete flag; inactive accounts are invisible to lookups
    pub active: bool,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub verification_token_digest: Option<String>,
    pub password_reset_token_digest: Option<String>,
    pub password_reset_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A freshly signed-up, unverified account
    pub fn new(
        name: String,
        email: String,
        password_hash: PasswordHash,
        verification_token_digest: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AccountId::generate(),
            name,
            email,
            password_hash,
            role: Role::User,
            verified: false,
            active: true,
            password_changed_at: None,
            verification_token_digest: Some(verification_token_digest),
            password_reset_token_digest: None,
            password_reset_expires_at: None,
            created_at: now,
        }
    }

    /// Whether the password changed after a token issued at `issued_at`
    /// (unix seconds). Only whole seconds are compared.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => changed_at.timestamp() > issued_at,
            None => false,
        }
    }

    pub fn clear_password_reset(&mut self) {
        self.password_reset_token_digest = None;
        self.password_reset_expires_at = None;
    }

    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            verified: self.verified,
        }
    }
}

/// The part of an account that may cross the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,
}

/// The durable record behind one live refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub account_id: AccountId,
    /// SHA-256 of the refresh token; the token itself is never stored
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        account_id: AccountId,
        token_digest: String,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            account_id,
            token_digest,
            expires_at,
            created_at: now,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

//! The closed error taxonomy for credential and session operations.
//!
//! Every variant except [`AuthError::Internal`] is operational: it has a
//! stable status code and a message that is safe to show to the caller.

use serde::Serialize;
use thiserror::Error;

use super::model::AccountProfile;
use super::password::PasswordError;
use super::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("You are not logged in! Please log in to get access")]
    Unauthenticated,

    #[error("Invalid or expired token. Please log in again")]
    TokenInvalid,

    #[error("Your token has expired. Please log in again")]
    TokenExpired,

    /// The caller is identified but gated; the profile is exposed so a UI
    /// can say who needs to verify.
    #[error("Please verify your email")]
    EmailNotVerified(Box<AccountProfile>),

    #[error("User recently changed password! Please log in again.")]
    StalePassword,

    #[error("The user belonging to this token no longer exists")]
    AccountGone,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Invalid or expired session. Please log in again")]
    SessionInvalid,

    /// `detail` is for the logs only
    #[error("There was an error sending the email. Try again later")]
    Notification { detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Fieldless mirror of [`AuthError`], convenient for matching and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InvalidCredentials,
    Unauthenticated,
    TokenInvalid,
    TokenExpired,
    EmailNotVerified,
    StalePassword,
    AccountGone,
    Forbidden,
    SessionInvalid,
    Notification,
    Internal,
}

/// What crosses the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::TokenInvalid => ErrorKind::TokenInvalid,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::EmailNotVerified(_) => ErrorKind::EmailNotVerified,
            Self::StalePassword => ErrorKind::StalePassword,
            Self::AccountGone => ErrorKind::AccountGone,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::SessionInvalid => ErrorKind::SessionInvalid,
            Self::Notification { .. } => ErrorKind::Notification,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status classification
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::InvalidCredentials
            | Self::Unauthenticated
            | Self::TokenInvalid
            | Self::TokenExpired
            | Self::EmailNotVerified(_)
            | Self::StalePassword
            | Self::AccountGone
            | Self::SessionInvalid => 401,
            Self::Forbidden => 403,
            Self::Notification { .. } | Self::Internal(_) => 500,
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    pub fn public_message(&self) -> String {
        if self.is_operational() {
            self.to_string()
        } else {
            "Something went very wrong".to_string()
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        if !self.is_operational() {
            log::error!("Non-operational failure: {}", self);
        }
        ErrorResponse {
            status: if self.status_code() < 500 { "fail" } else { "error" },
            message: self.public_message(),
        }
    }

    /// The partially identified caller behind an `EmailNotVerified`
    pub fn unverified_account(&self) -> Option<&AccountProfile> {
        match self {
            Self::EmailNotVerified(profile) => Some(profile),
            _ => None,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // Only user-supplied fields are user-fixable
            StoreError::Conflict(field @ "email") => Self::Validation(format!(
                "Duplicate field value: {}. Please use another value",
                field
            )),
            other => {
                log::error!("Store failure: {}", other);
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        Self::Validation(err.to_string())
    }
}

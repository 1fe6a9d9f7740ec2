//! Credentials, sessions and the request-time gates built on them.

mod credentials;
pub mod error;
pub mod middleware;
pub mod model;
pub mod password;
mod recovery;
pub mod service;
pub mod session;
pub mod store;
pub mod tokens;
mod verification;

#[cfg(test)]
mod testkit;

pub use error::{AuthError, ErrorKind, ErrorResponse};
pub use middleware::{
    clearing_cookies, recovery_redirect, restrict_to, restrict_to_owner, AuthContext, CookieSpec,
    Identity, RequestCredentials, SameSite,
};
pub use model::{Account, AccountId, AccountProfile, Role, Session, SessionId};
pub use password::{PasswordError, PasswordHash, PasswordHasher, PasswordPolicy};
pub use recovery::ForgotPasswordAck;
pub use service::{AuthService, SignedIn};
pub use session::SessionManager;
pub use store::{AccountStore, MemoryAccountStore, MemorySessionStore, SessionStore, StoreError};
pub use tokens::{digest_token, Claims, SecretToken, TokenIssuer, TokenKind, TokenPair};
pub use verification::VerifyOutcome;

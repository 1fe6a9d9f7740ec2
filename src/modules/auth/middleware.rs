//! Request-time authentication and authorization.
//!
//! Requests present credentials through up to three carriers: an
//! `Authorization: Bearer` header, the `jwt` cookie and the
//! `refreshToken` cookie. [`AuthService::protect`] is the hard gate;
//! [`AuthService::identify`] is best-effort and never fails.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

use super::error::{AuthError, ErrorKind};
use super::model::{Account, AccountId, Role};
use super::service::AuthService;
use super::tokens::{TokenKind, TokenPair};
use crate::{ACCESS_COOKIE, REFRESH_COOKIE, REFRESH_PATH};

/// The credential carriers of one request, as received
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
    pub access_cookie: Option<String>,
    pub refresh_cookie: Option<String>,
}

impl RequestCredentials {
    pub fn bearer(token: &str) -> Self {
        Self {
            authorization: Some(format!("Bearer {}", token)),
            ..Self::default()
        }
    }

    pub fn cookies(access: Option<&str>, refresh: Option<&str>) -> Self {
        Self {
            authorization: None,
            access_cookie: access.map(str::to_string),
            refresh_cookie: refresh.map(str::to_string),
        }
    }

    /// Bearer header first, then the access cookie
    pub fn access_token(&self) -> Option<&str> {
        let bearer = self
            .authorization
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        bearer.or_else(|| non_empty(self.access_cookie.as_deref()))
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(self.refresh_cookie.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// What a protected handler gets to work with
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
    pub token_issued_at: DateTime<Utc>,
}

/// Outcome of soft identification
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Identified(Box<Account>),
    /// Identified through a transparent refresh. The new pair must be
    /// handed back to the client.
    Refreshed {
        account: Box<Account>,
        tokens: TokenPair,
    },
}

impl Identity {
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Anonymous => None,
            Self::Identified(account) | Self::Refreshed { account, .. } => Some(&**account),
        }
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        match self {
            Self::Refreshed { tokens, .. } => Some(tokens),
            _ => None,
        }
    }
}

impl AuthService {
    /// Hard-mode authentication
    pub async fn protect(&self, credentials: &RequestCredentials) -> Result<AuthContext, AuthError> {
        let token = credentials.access_token().ok_or(AuthError::Unauthenticated)?;
        let claims = self
            .sessions
            .issuer()
            .verify(token, TokenKind::Access, self.clock.now())?;

        let account = self
            .store(self.accounts.find_by_id(&claims.sub))
            .await?
            .ok_or(AuthError::AccountGone)?;
        if !account.verified {
            return Err(AuthError::EmailNotVerified(Box::new(account.profile())));
        }
        if account.changed_password_after(claims.iat) {
            return Err(AuthError::StalePassword);
        }

        Ok(AuthContext {
            token_issued_at: claims.issued_at(),
            account,
        })
    }

    /// Soft-mode identification. Does not check email verification.
    pub async fn identify(&self, credentials: &RequestCredentials) -> Identity {
        if let Some(token) = credentials.access_token() {
            match self.identify_access(token).await {
                Ok(account) => return Identity::Identified(Box::new(account)),
                Err(e) => log::debug!("Access token not usable for identify: {}", e),
            }
        }

        let Some(refresh_token) = credentials.refresh_token() else {
            return Identity::Anonymous;
        };
        match self.sessions.rotate_session(refresh_token).await {
            Ok((account, tokens)) => Identity::Refreshed {
                account: Box::new(account),
                tokens,
            },
            Err(e) => {
                if !e.is_operational() {
                    log::error!("Transparent refresh failed: {}", e);
                }
                Identity::Anonymous
            }
        }
    }

    async fn identify_access(&self, token: &str) -> Result<Account, AuthError> {
        let claims = self
            .sessions
            .issuer()
            .verify(token, TokenKind::Access, self.clock.now())?;
        let account = self
            .store(self.accounts.find_by_id(&claims.sub))
            .await?
            .ok_or(AuthError::AccountGone)?;
        if account.changed_password_after(claims.iat) {
            return Err(AuthError::StalePassword);
        }
        Ok(account)
    }
}

pub fn restrict_to(allowed: &[Role], account: &Account) -> Result<(), AuthError> {
    if allowed.contains(&account.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Owners and admins pass
pub fn restrict_to_owner(owner: &AccountId, account: &Account) -> Result<(), AuthError> {
    if &account.id == owner || account.role == Role::Admin {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Where to send a browser whose hard-mode check failed but who still
/// holds a refresh cookie. Verification failures are not recoverable this
/// way, and `original_url` must be a local path (`/...`, not `//...`).
pub fn recovery_redirect(
    error: &AuthError,
    credentials: &RequestCredentials,
    original_url: &str,
) -> Option<String> {
    if error.status_code() != 401 || error.kind() == ErrorKind::EmailNotVerified {
        return None;
    }
    credentials.refresh_token()?;
    if !is_local_path(original_url) {
        log::warn!("Refusing recovery redirect to non-local target");
        return None;
    }
    Some(format!("{}?redirect={}", REFRESH_PATH, encode_query_value(original_url)))
}

fn is_local_path(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.starts_with("/\\")
        && !url.chars().any(char::is_control)
}

/// Percent-encode everything but unreserved characters and `/`
fn encode_query_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SameSite {
    Strict,
    Lax,
}

/// A cookie to set on the response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieSpec {
    pub name: &'static str,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl fmt::Display for CookieSpec {
    /// Renders as a `Set-Cookie` header value
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path=/; Expires={}",
            self.name,
            self.value,
            self.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
        )?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        match self.same_site {
            Some(SameSite::Strict) => f.write_str("; SameSite=Strict"),
            Some(SameSite::Lax) => f.write_str("; SameSite=Lax"),
            None => Ok(()),
        }
    }
}

impl TokenPair {
    /// Access and refresh cookies, expiring with their tokens
    pub fn cookies(&self, secure: bool) -> [CookieSpec; 2] {
        [
            CookieSpec {
                name: ACCESS_COOKIE,
                value: self.access_token.clone(),
                expires_at: self.access_expires_at,
                http_only: true,
                secure,
                same_site: None,
            },
            CookieSpec {
                name: REFRESH_COOKIE,
                value: self.refresh_token.clone(),
                expires_at: self.refresh_expires_at,
                http_only: true,
                secure,
                same_site: Some(SameSite::Strict),
            },
        ]
    }
}

/// Overwrites both carriers with empty, already-expired cookies
pub fn clearing_cookies(secure: bool) -> [CookieSpec; 2] {
    let epoch = Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);
    [
        CookieSpec {
            name: ACCESS_COOKIE,
            value: String::new(),
            expires_at: epoch,
            http_only: true,
            secure,
            same_site: None,
        },
        CookieSpec {
            name: REFRESH_COOKIE,
            value: String::new(),
            expires_at: epoch,
            http_only: true,
            secure,
            same_site: Some(SameSite::Strict),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::auth::testkit::Harness;
    use chrono::Duration;

    #[test]
    fn test_bearer_wins_over_cookie() {
        let mut creds = RequestCredentials::cookies(Some("cookie"), Some("refresh"));
        assert_eq!(creds.access_token(), Some("cookie"));

        creds.authorization = Some("Bearer header".to_string());
        assert_eq!(creds.access_token(), Some("header"));

        creds.authorization = Some("Basic abc".to_string());
        assert_eq!(creds.access_token(), Some("cookie"));
        assert_eq!(creds.refresh_token(), Some("refresh"));
    }

    #[test]
    fn test_blank_carriers_are_absent() {
        let creds = RequestCredentials {
            authorization: Some("Bearer   ".to_string()),
            access_cookie: Some(String::new()),
            refresh_cookie: Some(" ".to_string()),
        };
        assert!(creds.access_token().is_none());
        assert!(creds.refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_protect_without_token() {
        let h = Harness::new();
        let err = h
            .service
            .protect(&RequestCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_protect_accepts_cookie_and_bearer() {
        let h = Harness::new();
        let account = h.seed_verified("a@x.com", "secret123").await;
        let tokens = h.service.sessions().create_session(&account).await.unwrap();

        for creds in [
            RequestCredentials::bearer(&tokens.access_token),
            RequestCredentials::cookies(Some(&tokens.access_token), None),
        ] {
            let ctx = h.service.protect(&creds).await.unwrap();
            assert_eq!(ctx.account.id, account.id);
        }
    }

    #[tokio::test]
    async fn test_protect_rejects_refresh_token_and_expired_access() {
        let h = Harness::new();
        let account = h.seed_verified("a@x.com", "secret123").await;
        let tokens = h.service.sessions().create_session(&account).await.unwrap();

        let err = h
            .service
            .protect(&RequestCredentials::bearer(&tokens.refresh_token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenInvalid);

        h.clock.advance(Duration::minutes(16));
        let err = h
            .service
            .protect(&RequestCredentials::bearer(&tokens.access_token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenExpired);
    }

    #[tokio::test]
    async fn test_unverified_caller_is_gated_but_identified() {
        let h = Harness::new();
        let signed_in = h
            .service
            .signup("A", "a@x.com", "secret123", "secret123")
            .await
            .unwrap();
        let creds = RequestCredentials::bearer(&signed_in.tokens.access_token);

        let err = h.service.protect(&creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmailNotVerified);
        assert_eq!(err.unverified_account().unwrap().email, "a@x.com");

        // Soft mode does not care
        let identity = h.service.identify(&creds).await;
        assert!(matches!(identity, Identity::Identified(_)));
    }

    #[tokio::test]
    async fn test_identify_falls_back_to_refresh() {
        let h = Harness::new();
        let account = h.seed_verified("a@x.com", "secret123").await;
        let tokens = h.service.sessions().create_session(&account).await.unwrap();

        h.clock.advance(Duration::minutes(20));
        let creds = RequestCredentials::cookies(
            Some(&tokens.access_token),
            Some(&tokens.refresh_token),
        );
        let identity = h.service.identify(&creds).await;
        let fresh = identity.tokens().unwrap().clone();
        assert_eq!(identity.account().unwrap().id, account.id);
        assert_ne!(fresh.refresh_token, tokens.refresh_token);

        // The consumed token degrades to anonymous
        let identity = h.service.identify(&creds).await;
        assert!(matches!(identity, Identity::Anonymous));
    }

    #[tokio::test]
    async fn test_identify_never_fails() {
        let h = Harness::new();
        let garbage = RequestCredentials {
            authorization: Some("Bearer x.y.z".to_string()),
            access_cookie: None,
            refresh_cookie: Some("nope".to_string()),
        };
        assert!(matches!(h.service.identify(&garbage).await, Identity::Anonymous));
        assert!(matches!(
            h.service.identify(&RequestCredentials::default()).await,
            Identity::Anonymous
        ));
    }

    #[tokio::test]
    async fn test_restrictions() {
        let h = Harness::new();
        let mut account = h.seed_verified("a@x.com", "secret123").await;
        let other = AccountId::generate();

        assert!(restrict_to(&[Role::User, Role::Guide], &account).is_ok());
        let err = restrict_to(&[Role::Admin, Role::LeadGuide], &account).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        assert!(restrict_to_owner(&account.id.clone(), &account).is_ok());
        assert_eq!(
            restrict_to_owner(&other, &account).unwrap_err().kind(),
            ErrorKind::Forbidden
        );

        account.role = Role::Admin;
        assert!(restrict_to_owner(&other, &account).is_ok());
    }

    #[test]
    fn test_recovery_redirect() {
        let with_refresh = RequestCredentials::cookies(None, Some("rt"));
        let without = RequestCredentials::default();

        assert_eq!(
            recovery_redirect(&AuthError::TokenExpired, &with_refresh, "/me").as_deref(),
            Some("/api/v1/users/refresh?redirect=/me")
        );
        assert!(recovery_redirect(&AuthError::TokenExpired, &without, "/me").is_none());
        assert_eq!(
            recovery_redirect(&AuthError::StalePassword, &with_refresh, "/tours?a=1&b=2").as_deref(),
            Some("/api/v1/users/refresh?redirect=/tours%3Fa%3D1%26b%3D2")
        );
        for target in ["//evil.com", "https://evil.com/", "/\\evil.com", "me", ""] {
            assert!(
                recovery_redirect(&AuthError::TokenExpired, &with_refresh, target).is_none(),
                "accepted {:?}",
                target
            );
        }
        assert!(recovery_redirect(&AuthError::Forbidden, &with_refresh, "/me").is_none());

        let profile = crate::modules::auth::model::AccountProfile {
            id: AccountId::generate(),
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            role: Role::User,
            verified: false,
        };
        let unverified = AuthError::EmailNotVerified(Box::new(profile));
        assert!(recovery_redirect(&unverified, &with_refresh, "/me").is_none());
    }

    #[tokio::test]
    async fn test_cookie_rendering() {
        let h = Harness::new();
        let account = h.seed_verified("a@x.com", "secret123").await;
        let tokens = h.service.sessions().create_session(&account).await.unwrap();

        let [access, refresh] = tokens.cookies(true);
        assert_eq!(access.name, "jwt");
        assert_eq!(access.expires_at, tokens.access_expires_at);
        let header = refresh.to_string();
        assert!(header.starts_with(&format!("refreshToken={};", tokens.refresh_token)));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
        assert!(header.ends_with("SameSite=Strict"));

        let [cleared, _] = clearing_cookies(false);
        assert!(cleared.to_string().contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(!cleared.to_string().contains("Secure"));
    }
}

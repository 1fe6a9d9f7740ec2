use super::error::AuthError;
use super::middleware::{clearing_cookies, CookieSpec, RequestCredentials};
use super::model::Account;
use super::service::{AuthService, SignedIn};
use super::tokens::SecretToken;
use crate::email::{NotificationPayload, TemplateKind};
use crate::utils::{is_valid_email, log_auth_event, normalize_email};

impl AuthService {
    /// Register an unverified account, email the confirmation link and
    /// sign it in.
    ///
    /// If the email cannot be sent the stored verification digest is
    /// cleared and the call fails with `Notification`.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<SignedIn, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("Please provide a name".to_string()));
        }
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::Validation(
                "Please provide a valid email".to_string(),
            ));
        }
        self.policy.validate(password, password_confirm)?;

        if self.store(self.accounts.find_by_email(&email)).await?.is_some() {
            return Err(AuthError::Validation(
                "Email is already registered".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(password).await?;
        let token = SecretToken::verification();
        let account = Account::new(
            name.to_string(),
            email.clone(),
            password_hash,
            token.digest().to_string(),
            self.clock.now(),
        );
        self.store(self.accounts.create(account.clone())).await?;

        let payload = NotificationPayload {
            link: self.link(&format!("?token={}&email={}", token.raw(), email)),
            token: token.raw().to_string(),
            valid_for: None,
        };
        if let Err(err) = self.notify(&account, TemplateKind::EmailConfirm, payload).await {
            let rollback = self.accounts.clear_verification_if(&account.id, token.digest());
            if let Err(rollback) = self.store(rollback).await {
                log::error!("Signup rollback failed for {}: {}", account.id, rollback);
            }
            log_auth_event("signup", &email, false, Some("confirmation email not sent"));
            return Err(err);
        }

        log_auth_event("signup", &email, true, None);
        self.sign_in(&account).await
    }

    /// "No such account" and "wrong password" are indistinguishable,
    /// in message and in cost.
    pub async fn login(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Please provide email and password!".to_string(),
            ));
        }
        let email = normalize_email(email);

        let Some(account) = self.store(self.accounts.find_by_email(&email)).await? else {
            self.hasher.verify_decoy(password).await?;
            log_auth_event("login", &email, false, Some("unknown account"));
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &account.password_hash).await? {
            log_auth_event("login", &email, false, Some("wrong password"));
            return Err(AuthError::InvalidCredentials);
        }

        log_auth_event("login", &email, true, None);
        self.sign_in(&account).await
    }

    /// Explicit refresh. Unlike soft identification this reports failures.
    pub async fn refresh(&self, credentials: &RequestCredentials) -> Result<SignedIn, AuthError> {
        let refresh_token = credentials
            .refresh_token()
            .ok_or_else(|| AuthError::Validation("Refresh token missing".to_string()))?;

        let (account, tokens) = self.sessions.rotate_session(refresh_token).await?;
        Ok(SignedIn {
            account: account.profile(),
            tokens,
        })
    }

    /// Drop the session behind the presented refresh token, if any, and
    /// hand back the cookies that clear both carriers.
    pub async fn logout(
        &self,
        credentials: &RequestCredentials,
        secure: bool,
    ) -> Result<[CookieSpec; 2], AuthError> {
        if let Some(refresh_token) = credentials.refresh_token() {
            self.sessions.revoke_session(refresh_token).await?;
        }
        Ok(clearing_cookies(secure))
    }

    pub async fn logout_all_devices(&self, account: &Account) -> Result<usize, AuthError> {
        let removed = self.sessions.revoke_all_sessions(&account.id).await?;
        log_auth_event("logout_all_devices", account.id.as_str(), true, None);
        Ok(removed)
    }

    /// Soft delete. The record stays (and keeps its email reserved) but
    /// is excluded from every lookup.
    pub async fn deactivate_account(&self, account: &Account) -> Result<(), AuthError> {
        if !self.store(self.accounts.deactivate(&account.id)).await? {
            return Err(AuthError::AccountGone);
        }
        self.sessions.revoke_all_sessions(&account.id).await?;
        log_auth_event("deactivate", account.id.as_str(), true, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::modules::auth::testkit::Harness;
    use crate::modules::auth::{ErrorKind, RequestCredentials};
    use crate::email::TemplateKind;

    #[tokio::test]
    async fn test_signup_creates_unverified_account_and_session() {
        let h = Harness::new();
        let signed_in = h
            .service
            .signup("A", "A@X.com ", "secret123", "secret123")
            .await
            .unwrap();

        assert_eq!(signed_in.account.email, "a@x.com");
        assert!(!signed_in.account.verified);
        assert_eq!(h.sessions.count_for(&signed_in.account.id, h.clock_now()), 1);

        let sent = h.notifier.last(TemplateKind::EmailConfirm).unwrap();
        assert!(sent.link.contains(&format!("token={}", sent.token)));
        assert!(sent.link.contains("email=a@x.com"));

        let stored = h.account("a@x.com").await;
        assert_ne!(stored.verification_token_digest.as_deref(), Some(sent.token.as_str()));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let h = Harness::new();
        let cases = [
            ("", "a@x.com", "secret123", "secret123"),
            ("A", "not-an-email", "secret123", "secret123"),
            ("A", "a@x.com", "short", "short"),
            ("A", "a@x.com", "secret123", "secret321"),
        ];
        for (name, email, password, confirm) in cases {
            let err = h.service.signup(name, email, password, confirm).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "case {:?}", (name, email));
        }
        assert!(h.notifier.is_empty());
    }

    #[tokio::test]
    async fn test_signup_rejects_taken_email() {
        let h = Harness::new();
        h.service.signup("A", "a@x.com", "secret123", "secret123").await.unwrap();

        let err = h
            .service
            .signup("B", "a@X.com", "secret456", "secret456")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_signup_rolls_back_when_email_fails() {
        let h = Harness::new();
        h.notifier.fail_next();

        let err = h
            .service
            .signup("A", "a@x.com", "secret123", "secret123")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Notification);

        let stored = h.account("a@x.com").await;
        assert!(stored.verification_token_digest.is_none());
        assert_eq!(h.sessions.count_for(&stored.id, h.clock_now()), 0);
    }

    #[tokio::test]
    async fn test_signup_treats_notifier_timeout_as_failure() {
        let h = Harness::new();
        h.notifier.stall_next();

        let err = h
            .service
            .signup("A", "a@x.com", "secret123", "secret123")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Notification);
        assert!(h.account("a@x.com").await.verification_token_digest.is_none());
    }

    #[tokio::test]
    async fn test_login_round_trip() {
        let h = Harness::new();
        h.seed_verified("a@x.com", "secret123").await;

        let signed_in = h.service.login("A@x.com", "secret123").await.unwrap();
        let ctx = h
            .service
            .protect(&RequestCredentials::bearer(&signed_in.tokens.access_token))
            .await
            .unwrap();
        assert_eq!(ctx.account.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = Harness::new();
        h.seed_verified("a@x.com", "secret123").await;

        let wrong_password = h.service.login("a@x.com", "secret124").await.unwrap_err();
        let no_account = h.service.login("fake@x.com", "secret123").await.unwrap_err();

        assert_eq!(wrong_password.kind(), ErrorKind::InvalidCredentials);
        assert_eq!(wrong_password.kind(), no_account.kind());
        assert_eq!(wrong_password.to_response(), no_account.to_response());
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let h = Harness::new();
        let err = h.service.login("", "secret123").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Please provide email and password!");
    }

    #[tokio::test]
    async fn test_refresh_requires_carrier() {
        let h = Harness::new();
        let err = h
            .service
            .refresh(&RequestCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_logout_revokes_only_that_session() {
        let h = Harness::new();
        h.seed_verified("a@x.com", "secret123").await;
        let laptop = h.service.login("a@x.com", "secret123").await.unwrap();
        let phone = h.service.login("a@x.com", "secret123").await.unwrap();

        let cookies = h
            .service
            .logout(&RequestCredentials::cookies(None, Some(&laptop.tokens.refresh_token)), true)
            .await
            .unwrap();
        assert!(cookies.iter().all(|c| c.value.is_empty()));

        let err = h
            .service
            .refresh(&RequestCredentials::cookies(None, Some(&laptop.tokens.refresh_token)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionInvalid);
        assert!(h
            .service
            .refresh(&RequestCredentials::cookies(None, Some(&phone.tokens.refresh_token)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_logout_all_devices_kills_every_refresh_token() {
        let h = Harness::new();
        let account = h.seed_verified("a@x.com", "secret123").await;
        let first = h.service.login("a@x.com", "secret123").await.unwrap();
        let second = h.service.login("a@x.com", "secret123").await.unwrap();

        assert_eq!(h.service.logout_all_devices(&account).await.unwrap(), 2);

        for signed_in in [first, second] {
            let err = h
                .service
                .sessions()
                .rotate_session(&signed_in.tokens.refresh_token)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SessionInvalid);
        }
    }

    #[tokio::test]
    async fn test_deactivated_account_is_gone() {
        let h = Harness::new();
        let account = h.seed_verified("a@x.com", "secret123").await;
        let signed_in = h.service.login("a@x.com", "secret123").await.unwrap();

        h.service.deactivate_account(&account).await.unwrap();

        let err = h
            .service
            .protect(&RequestCredentials::bearer(&signed_in.tokens.access_token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountGone);

        let err = h.service.login("a@x.com", "secret123").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);

        let err = h
            .service
            .signup("A", "a@x.com", "secret123", "secret123")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

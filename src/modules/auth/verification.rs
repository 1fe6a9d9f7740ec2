use super::error::AuthError;
use super::service::{AuthService, SignedIn};
use super::tokens::digest_token;
use crate::utils::{log_auth_event, normalize_email};

/// Result of redeeming an email confirmation link
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// Freshly verified; the account is signed in on a new session
    Verified(SignedIn),
    AlreadyVerified,
}

impl AuthService {
    pub async fn verify_email(&self, email: &str, raw_token: &str) -> Result<VerifyOutcome, AuthError> {
        let email = normalize_email(email);
        let account = self
            .store(self.accounts.find_by_email(&email))
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if account.verified {
            return Ok(VerifyOutcome::AlreadyVerified);
        }

        let presented = digest_token(raw_token.trim());
        let verified = self
            .store(self.accounts.mark_verified_if(&account.id, &presented))
            .await?;
        let Some(account) = verified else {
            // A concurrent redemption of the same link may have won
            if self.reload(&account).await?.verified {
                return Ok(VerifyOutcome::AlreadyVerified);
            }
            log_auth_event("verify_email", &email, false, Some("token mismatch"));
            return Err(AuthError::TokenInvalid);
        };

        log_auth_event("verify_email", &email, true, None);
        self.sign_in(&account).await.map(VerifyOutcome::Verified)
    }
}

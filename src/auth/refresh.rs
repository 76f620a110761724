use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::auth::token::{hash_token, TokenError, TokenSigner};
use crate::auth::IdentityClaim;
use crate::calendar::User;
use crate::storage::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid or expired token: {0}")]
    Token(#[from] TokenError),
    #[error("Refresh token has been revoked")]
    Revoked,
    #[error("User {0} no longer exists")]
    UnknownUser(i64),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues token pairs and keeps the server-side record of live refresh tokens.
#[derive(Clone)]
pub struct TokenService {
    signer: TokenSigner,
    store: Arc<Store>,
}

impl TokenService {
    pub fn new(signer: TokenSigner, store: Arc<Store>) -> Self {
        Self { signer, store }
    }

    pub fn verify_access(&self, raw: &str) -> Result<IdentityClaim, TokenError> {
        self.signer.verify_access(raw)
    }

    /// Checks an email and password against the stored bcrypt hash and issues a pair.
    /// Unknown emails and wrong passwords fail the same way.
    pub fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let Some((user, password_hash)) = self.store.credentials_by_email(email)? else {
            tracing::warn!("login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !bcrypt::verify(password, &password_hash)? {
            tracing::warn!(user_id = user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        self.issue(&user)
    }

    pub fn issue(&self, user: &User) -> Result<TokenPair, AuthError> {
        let access_token = self.signer.issue_access(&IdentityClaim::new(user.id, user.role))?;
        let refresh = self.signer.issue_refresh(user.id)?;
        self.store
            .save_refresh_token(user.id, &hash_token(&refresh.token), refresh.expires_at)?;

        tracing::info!(user_id = user.id, "issued token pair");
        Ok(TokenPair {
            user_id: user.id,
            access_token,
            refresh_token: refresh.token,
        })
    }

    /// Exchanges a live refresh token for a new pair. The presented token is rotated out.
    pub fn refresh(&self, raw: &str) -> Result<TokenPair, AuthError> {
        let user_id = self.signer.verify_refresh(raw)?;
        let old_hash = hash_token(raw);
        if !self.store.refresh_token_exists(&old_hash)? {
            tracing::warn!(user_id, "refresh token not on record");
            return Err(AuthError::Revoked);
        }

        let user = self
            .store
            .user_by_id(user_id)?
            .ok_or(AuthError::UnknownUser(user_id))?;

        let access_token = self.signer.issue_access(&IdentityClaim::new(user.id, user.role))?;
        let refresh = self.signer.issue_refresh(user.id)?;
        let rotated = self.store.rotate_refresh_token(
            &old_hash,
            user.id,
            &hash_token(&refresh.token),
            refresh.expires_at,
        )?;
        if !rotated {
            return Err(AuthError::Revoked);
        }

        Ok(TokenPair {
            user_id: user.id,
            access_token,
            refresh_token: refresh.token,
        })
    }

    /// Returns whether a stored refresh token was actually removed.
    pub fn logout(&self, raw: &str) -> Result<bool, AuthError> {
        Ok(self.store.delete_refresh_token(&hash_token(raw))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{NewUser, UserRole};
    use chrono::Duration;

    fn create_test_service() -> (TokenService, User) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let password_hash = bcrypt::hash("correct horse", 4).unwrap();
        let user = store
            .create_user(
                &NewUser {
                    display_name: "Alice".to_string(),
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    password: "correct horse".to_string(),
                },
                &password_hash,
                UserRole::Admin,
            )
            .unwrap();
        let signer = TokenSigner::new("a", "r", Duration::minutes(15), Duration::days(7));
        (TokenService::new(signer, store), user)
    }

    #[test]
    fn issued_access_token_carries_user_role() {
        let (service, user) = create_test_service();

        let pair = service.issue(&user).unwrap();

        assert_eq!(service.verify_access(&pair.access_token).unwrap(), IdentityClaim::admin(user.id));
    }

    #[test]
    fn login_with_correct_password_issues_usable_pair() {
        let (service, user) = create_test_service();

        let pair = service.login("alice@example.com", "correct horse").unwrap();

        assert_eq!(pair.user_id, user.id);
        assert_eq!(service.verify_access(&pair.access_token).unwrap(), IdentityClaim::admin(user.id));
        assert!(service.refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn login_rejects_wrong_password_and_unknown_email() {
        let (service, _) = create_test_service();

        assert!(matches!(
            service.login("alice@example.com", "battery staple"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("nobody@example.com", "correct horse"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn refresh_rotates_the_refresh_token() {
        let (service, user) = create_test_service();
        let pair = service.issue(&user).unwrap();

        let refreshed = service.refresh(&pair.refresh_token).unwrap();

        assert_eq!(refreshed.user_id, user.id);
        assert_ne!(refreshed.refresh_token, pair.refresh_token);
        assert!(matches!(service.refresh(&pair.refresh_token), Err(AuthError::Revoked)));
        assert!(service.refresh(&refreshed.refresh_token).is_ok());
    }

    #[test]
    fn logged_out_token_cannot_refresh() {
        let (service, user) = create_test_service();
        let pair = service.issue(&user).unwrap();

        assert!(service.logout(&pair.refresh_token).unwrap());
        assert!(!service.logout(&pair.refresh_token).unwrap());
        assert!(matches!(service.refresh(&pair.refresh_token), Err(AuthError::Revoked)));
    }

    #[test]
    fn access_token_cannot_be_used_to_refresh() {
        let (service, user) = create_test_service();
        let pair = service.issue(&user).unwrap();

        assert!(matches!(service.refresh(&pair.access_token), Err(AuthError::Token(_))));
    }
}

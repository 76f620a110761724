use std::fmt;

use thiserror::Error;

use crate::auth::{AuthError, TokenError};
use crate::calendar::ValidationKind;
use crate::policy::{AuthzDecision, DenyReason, MembershipError};
use crate::storage::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Calendar,
    User,
    Event,
    Category,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Calendar => "Calendar",
            Resource::User => "User",
            Resource::Event => "Event",
            Resource::Category => "Category",
        })
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    Validation(ValidationKind),
    #[error("{resource} not found")]
    NotFound { resource: Resource },
    #[error("User \"{0}\" not found")]
    UnknownUsername(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid or expired token: {0}")]
    Token(#[from] TokenError),
}

impl ServiceError {
    pub fn not_found(resource: Resource) -> Self {
        ServiceError::NotFound { resource }
    }

    /// HTTP status a REST controller should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Unauthenticated
            | ServiceError::InvalidCredentials
            | ServiceError::Token(_) => 401,
            ServiceError::Forbidden => 403,
            ServiceError::Validation(_) | ServiceError::UnknownUsername(_) => 400,
            ServiceError::NotFound { .. } => 404,
            ServiceError::Conflict(_)
            | ServiceError::Store(StoreError::Conflict(_) | StoreError::LastOwner { .. }) => 409,
            ServiceError::Store(_) | ServiceError::Password(_) => 500,
        }
    }

    /// Message a GraphQL resolver should raise. Storage details stay server-side.
    pub fn graphql_message(&self) -> String {
        match self {
            ServiceError::Store(StoreError::Conflict(_) | StoreError::LastOwner { .. }) => {
                "Conflicting update".to_string()
            }
            ServiceError::Store(_) | ServiceError::Password(_) => "Internal server error".to_string(),
            ServiceError::Token(_) => "Unauthorized".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ValidationKind> for ServiceError {
    fn from(kind: ValidationKind) -> Self {
        ServiceError::Validation(kind)
    }
}

impl From<MembershipError> for ServiceError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::Invalid(kind) => ServiceError::Validation(kind),
            MembershipError::UnknownUsername(username) => ServiceError::UnknownUsername(username),
            MembershipError::Lookup(store) => ServiceError::Store(store),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Token(token) => ServiceError::Token(token),
            AuthError::Revoked | AuthError::UnknownUser(_) => ServiceError::Unauthenticated,
            AuthError::InvalidCredentials => ServiceError::InvalidCredentials,
            AuthError::Password(err) => ServiceError::Password(err),
            AuthError::Store(store) => ServiceError::Store(store),
        }
    }
}

/// Turns a policy decision into a service result, logging denials.
pub(crate) fn ensure(decision: AuthzDecision, resource: Resource) -> Result<(), ServiceError> {
    match decision.into_result() {
        Ok(()) => Ok(()),
        Err(reason) => {
            tracing::warn!(%resource, %reason, "authorization denied");
            Err(match reason {
                DenyReason::Unauthenticated => ServiceError::Unauthenticated,
                DenyReason::Forbidden => ServiceError::Forbidden,
                DenyReason::NotFound => ServiceError::not_found(resource),
            })
        }
    }
}

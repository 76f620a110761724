use std::sync::Arc;

use crate::auth::IdentityClaim;
use crate::calendar::validation::{require_text, validate_email};
use crate::calendar::{NewUser, User, UserPatch, UserRole};
use crate::policy::engine::{can_view_all_users, can_view_or_mutate_user};
use crate::service::error::{ensure, Resource, ServiceError};
use crate::storage::store::{Store, StoreError};

const DUPLICATE_USER: &str = "Email or username already in use";

#[derive(Clone)]
pub struct UserService {
    store: Arc<Store>,
    password_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<Store>, password_cost: u32) -> Self {
        Self { store, password_cost }
    }

    /// Self-service sign-up. Always creates a plain user.
    pub async fn register(&self, new_user: NewUser) -> Result<User, ServiceError> {
        self.register_with_role(new_user, UserRole::User).await
    }

    /// Used by the operator CLI to bootstrap the first admin.
    pub async fn register_with_role(&self, new_user: NewUser, role: UserRole) -> Result<User, ServiceError> {
        require_text(&new_user.username, "username")?;
        require_text(&new_user.display_name, "display_name")?;
        validate_email(&new_user.email)?;
        require_text(&new_user.password, "password")?;

        let password_hash = bcrypt::hash(&new_user.password, self.password_cost)?;
        let user = self
            .store
            .create_user(&new_user, &password_hash, role)
            .map_err(duplicate_as_conflict)?;
        tracing::info!(user_id = user.id, role = role.as_str(), "registered user");
        Ok(user)
    }

    pub async fn all_users(&self, claim: Option<&IdentityClaim>) -> Result<Vec<User>, ServiceError> {
        ensure(can_view_all_users(claim), Resource::User)?;
        Ok(self.store.all_users()?)
    }

    pub async fn user_by_id(&self, claim: Option<&IdentityClaim>, id: i64) -> Result<User, ServiceError> {
        ensure(can_view_or_mutate_user(claim, id), Resource::User)?;
        self.load(id)
    }

    pub async fn update_user(
        &self,
        claim: Option<&IdentityClaim>,
        id: i64,
        patch: UserPatch,
    ) -> Result<User, ServiceError> {
        ensure(can_view_or_mutate_user(claim, id), Resource::User)?;
        let current = self.load(id)?;
        if patch.is_empty() {
            return Ok(current);
        }

        if let Some(username) = &patch.username {
            require_text(username, "username")?;
        }
        if let Some(display_name) = &patch.display_name {
            require_text(display_name, "display_name")?;
        }
        if let Some(email) = &patch.email {
            validate_email(email)?;
        }

        let updated = User {
            display_name: patch.display_name.unwrap_or(current.display_name),
            username: patch.username.unwrap_or(current.username),
            email: patch.email.unwrap_or(current.email),
            email_confirmed: patch.email_confirmed.unwrap_or(current.email_confirmed),
            ..current
        };
        if !self.store.save_user(&updated).map_err(duplicate_as_conflict)? {
            return Err(ServiceError::not_found(Resource::User));
        }

        tracing::info!(user_id = id, "updated user");
        Ok(updated)
    }

    pub async fn delete_user(&self, claim: Option<&IdentityClaim>, id: i64) -> Result<(), ServiceError> {
        ensure(can_view_or_mutate_user(claim, id), Resource::User)?;
        let deleted = self.store.delete_user(id).map_err(|err| match err {
            StoreError::LastOwner { calendar_id } => {
                ServiceError::Conflict(format!("User is the only owner of calendar {calendar_id}"))
            }
            other => ServiceError::Store(other),
        })?;
        if !deleted {
            return Err(ServiceError::not_found(Resource::User));
        }
        tracing::info!(user_id = id, "deleted user");
        Ok(())
    }

    fn load(&self, id: i64) -> Result<User, ServiceError> {
        self.store
            .user_by_id(id)?
            .ok_or(ServiceError::not_found(Resource::User))
    }
}

fn duplicate_as_conflict(err: StoreError) -> ServiceError {
    match err {
        StoreError::Conflict(_) => ServiceError::Conflict(DUPLICATE_USER.to_string()),
        other => ServiceError::Store(other),
    }
}

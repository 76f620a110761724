use serde::{Deserialize, Serialize};

use crate::calendar::UserRole;

/// Verified identity for a single request. Trusted as-is once the token signature checks out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    pub user_id: i64,
    pub role: UserRole,
}

impl IdentityClaim {
    pub fn new(user_id: i64, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn user(user_id: i64) -> Self {
        Self::new(user_id, UserRole::User)
    }

    pub fn admin(user_id: i64) -> Self {
        Self::new(user_id, UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

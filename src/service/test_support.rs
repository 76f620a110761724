use std::sync::Arc;

use crate::auth::IdentityClaim;
use crate::calendar::{AccessLevel, Calendar, NewUser, User, UserRole};
use crate::policy::membership::ResolvedMember;
use crate::storage::store::Store;

pub(crate) struct Fixture {
    pub store: Arc<Store>,
    pub alice: User,
    pub bob: User,
    pub carol: User,
    pub root: User,
    pub calendar: Calendar,
}

impl Fixture {
    /// alice owns `calendar`, bob is a plain member, carol is an outsider, root is a platform admin.
    pub fn new() -> Self {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let alice = add_user(&store, "alice", UserRole::User);
        let bob = add_user(&store, "bob", UserRole::User);
        let carol = add_user(&store, "carol", UserRole::User);
        let root = add_user(&store, "root", UserRole::Admin);
        let calendar = store
            .create_calendar_with_members(
                "Family",
                None,
                &[
                    resolved(&alice, AccessLevel::Owner),
                    resolved(&bob, AccessLevel::Member),
                ],
            )
            .unwrap();

        Self {
            store,
            alice,
            bob,
            carol,
            root,
            calendar,
        }
    }

    pub fn claim(user: &User) -> IdentityClaim {
        IdentityClaim::new(user.id, user.role)
    }
}

/// Every fixture user's password is `<username>-password`.
pub(crate) fn add_user(store: &Store, username: &str, role: UserRole) -> User {
    let password = format!("{username}-password");
    let password_hash = bcrypt::hash(&password, 4).unwrap();
    store
        .create_user(
            &NewUser {
                display_name: username.to_uppercase(),
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password,
            },
            &password_hash,
            role,
        )
        .unwrap()
}

pub(crate) fn resolved(user: &User, access_level: AccessLevel) -> ResolvedMember {
    ResolvedMember {
        user_id: user.id,
        username: user.username.clone(),
        access_level,
    }
}

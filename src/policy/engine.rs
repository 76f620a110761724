//! Authorization decisions shared by every transport.
//!
//! Each check takes the request's claim as an `Option`. A missing claim is
//! always `Deny(Unauthenticated)` and is decided before the resource is looked at.
//! Resource lookups happen in the caller; a missing resource never reaches here.

use serde::{Deserialize, Serialize};

use crate::auth::IdentityClaim;
use crate::calendar::{AccessLevel, Calendar};
use crate::policy::decision::{AuthzDecision, DenyReason};

/// Who may update or delete a calendar besides platform admins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPolicy {
    /// Any member, whatever its access level.
    #[default]
    AnyMember,
    /// Only members holding `owner` or `admin` access.
    OwnerOrAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventIntent {
    View,
    Mutate,
}

fn authenticated(claim: Option<&IdentityClaim>) -> Result<&IdentityClaim, AuthzDecision> {
    claim.ok_or(AuthzDecision::Deny(DenyReason::Unauthenticated))
}

fn admin_only(claim: Option<&IdentityClaim>) -> AuthzDecision {
    match authenticated(claim) {
        Ok(claim) => AuthzDecision::allow_if(claim.is_admin()),
        Err(denied) => denied,
    }
}

pub fn can_view_all_calendars(claim: Option<&IdentityClaim>) -> AuthzDecision {
    admin_only(claim)
}

pub fn can_view_all_users(claim: Option<&IdentityClaim>) -> AuthzDecision {
    admin_only(claim)
}

pub fn can_view_event_stats(claim: Option<&IdentityClaim>) -> AuthzDecision {
    admin_only(claim)
}

pub fn can_view_calendar(claim: Option<&IdentityClaim>, calendar: &Calendar) -> AuthzDecision {
    match authenticated(claim) {
        Ok(claim) => AuthzDecision::allow_if(claim.is_admin() || calendar.has_member(claim.user_id)),
        Err(denied) => denied,
    }
}

/// Membership at any access level is enough, matching how calendars have always behaved.
pub fn can_mutate_calendar(claim: Option<&IdentityClaim>, calendar: &Calendar) -> AuthzDecision {
    PolicyEngine::default().can_mutate_calendar(claim, calendar)
}

pub fn can_view_or_mutate_user(claim: Option<&IdentityClaim>, target_user_id: i64) -> AuthzDecision {
    match authenticated(claim) {
        Ok(claim) => AuthzDecision::allow_if(claim.is_admin() || claim.user_id == target_user_id),
        Err(denied) => denied,
    }
}

pub fn can_access_event_via_calendar(
    claim: Option<&IdentityClaim>,
    owning_calendar: &Calendar,
    intent: EventIntent,
) -> AuthzDecision {
    PolicyEngine::default().can_access_event_via_calendar(claim, owning_calendar, intent)
}

/// Carries the configured [`MutationPolicy`]; everything else is policy-independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyEngine {
    mutation_policy: MutationPolicy,
}

impl PolicyEngine {
    pub fn new(mutation_policy: MutationPolicy) -> Self {
        Self { mutation_policy }
    }

    pub fn mutation_policy(&self) -> MutationPolicy {
        self.mutation_policy
    }

    pub fn can_mutate_calendar(&self, claim: Option<&IdentityClaim>, calendar: &Calendar) -> AuthzDecision {
        let claim = match authenticated(claim) {
            Ok(claim) => claim,
            Err(denied) => return denied,
        };
        if claim.is_admin() {
            return AuthzDecision::Allow;
        }

        let membership = calendar.member(claim.user_id);
        let allowed = match self.mutation_policy {
            MutationPolicy::AnyMember => membership.is_some(),
            MutationPolicy::OwnerOrAdmin => membership
                .map(|m| matches!(m.access_level, AccessLevel::Owner | AccessLevel::Admin))
                .unwrap_or(false),
        };
        AuthzDecision::allow_if(allowed)
    }

    pub fn can_access_event_via_calendar(
        &self,
        claim: Option<&IdentityClaim>,
        owning_calendar: &Calendar,
        intent: EventIntent,
    ) -> AuthzDecision {
        match intent {
            EventIntent::View => can_view_calendar(claim, owning_calendar),
            EventIntent::Mutate => self.can_mutate_calendar(claim, owning_calendar),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CalendarMembership, UserRole};
    use proptest::prelude::*;

    fn create_calendar(members: &[(i64, AccessLevel)]) -> Calendar {
        Calendar {
            id: 1,
            name: "Family".to_string(),
            color: None,
            members: members
                .iter()
                .map(|&(user_id, access_level)| CalendarMembership {
                    user_id,
                    calendar_id: 1,
                    access_level,
                })
                .collect(),
        }
    }

    const FORBIDDEN: AuthzDecision = AuthzDecision::Deny(DenyReason::Forbidden);
    const UNAUTHENTICATED: AuthzDecision = AuthzDecision::Deny(DenyReason::Unauthenticated);

    #[test]
    fn missing_claim_is_unauthenticated_everywhere() {
        let calendar = create_calendar(&[(1, AccessLevel::Owner)]);

        assert_eq!(can_view_all_calendars(None), UNAUTHENTICATED);
        assert_eq!(can_view_all_users(None), UNAUTHENTICATED);
        assert_eq!(can_view_event_stats(None), UNAUTHENTICATED);
        assert_eq!(can_view_calendar(None, &calendar), UNAUTHENTICATED);
        assert_eq!(can_mutate_calendar(None, &calendar), UNAUTHENTICATED);
        assert_eq!(can_view_or_mutate_user(None, 1), UNAUTHENTICATED);
        assert_eq!(
            can_access_event_via_calendar(None, &calendar, EventIntent::View),
            UNAUTHENTICATED
        );
    }

    #[test]
    fn admin_can_view_all_calendars() {
        assert_eq!(can_view_all_calendars(Some(&IdentityClaim::admin(1))), AuthzDecision::Allow);
    }

    #[test]
    fn regular_user_cannot_view_all_calendars() {
        assert_eq!(can_view_all_calendars(Some(&IdentityClaim::user(1))), FORBIDDEN);
    }

    #[test]
    fn member_can_view_calendar() {
        let calendar = create_calendar(&[(1, AccessLevel::Owner), (2, AccessLevel::Member)]);

        assert!(can_view_calendar(Some(&IdentityClaim::user(2)), &calendar).is_allowed());
    }

    #[test]
    fn outsider_cannot_view_calendar() {
        let calendar = create_calendar(&[(1, AccessLevel::Owner)]);

        assert_eq!(can_view_calendar(Some(&IdentityClaim::user(3)), &calendar), FORBIDDEN);
    }

    #[test]
    fn admin_outsider_can_view_calendar() {
        let calendar = create_calendar(&[(1, AccessLevel::Owner)]);

        assert!(can_view_calendar(Some(&IdentityClaim::admin(99)), &calendar).is_allowed());
    }

    #[test]
    fn lowest_access_member_can_mutate_by_default() {
        let calendar = create_calendar(&[(1, AccessLevel::Owner), (2, AccessLevel::Member)]);

        assert!(can_mutate_calendar(Some(&IdentityClaim::user(2)), &calendar).is_allowed());
    }

    #[test]
    fn owner_or_admin_policy_rejects_plain_member() {
        let engine = PolicyEngine::new(MutationPolicy::OwnerOrAdmin);
        let calendar = create_calendar(&[
            (1, AccessLevel::Owner),
            (2, AccessLevel::Admin),
            (3, AccessLevel::Member),
        ]);

        assert!(engine.can_mutate_calendar(Some(&IdentityClaim::user(1)), &calendar).is_allowed());
        assert!(engine.can_mutate_calendar(Some(&IdentityClaim::user(2)), &calendar).is_allowed());
        assert_eq!(engine.can_mutate_calendar(Some(&IdentityClaim::user(3)), &calendar), FORBIDDEN);
        assert!(engine.can_mutate_calendar(Some(&IdentityClaim::admin(50)), &calendar).is_allowed());
    }

    #[test]
    fn user_can_view_self_but_not_others() {
        let claim = IdentityClaim::user(4);

        assert!(can_view_or_mutate_user(Some(&claim), 4).is_allowed());
        assert_eq!(can_view_or_mutate_user(Some(&claim), 5), FORBIDDEN);
    }

    #[test]
    fn admin_can_view_any_user() {
        assert!(can_view_or_mutate_user(Some(&IdentityClaim::admin(1)), 77).is_allowed());
    }

    #[test]
    fn event_stats_and_user_listing_are_admin_only() {
        let user = IdentityClaim::user(1);
        let admin = IdentityClaim::admin(2);

        assert_eq!(can_view_all_users(Some(&user)), FORBIDDEN);
        assert_eq!(can_view_event_stats(Some(&user)), FORBIDDEN);
        assert!(can_view_all_users(Some(&admin)).is_allowed());
        assert!(can_view_event_stats(Some(&admin)).is_allowed());
    }

    #[test]
    fn event_access_follows_calendar_rules() {
        let calendar = create_calendar(&[(1, AccessLevel::Owner), (2, AccessLevel::Member)]);
        let strict = PolicyEngine::new(MutationPolicy::OwnerOrAdmin);
        let member = IdentityClaim::user(2);

        assert!(strict
            .can_access_event_via_calendar(Some(&member), &calendar, EventIntent::View)
            .is_allowed());
        assert_eq!(
            strict.can_access_event_via_calendar(Some(&member), &calendar, EventIntent::Mutate),
            FORBIDDEN
        );
        assert_eq!(
            can_access_event_via_calendar(Some(&IdentityClaim::user(8)), &calendar, EventIntent::View),
            FORBIDDEN
        );
    }

    fn role_strategy() -> impl Strategy<Value = UserRole> {
        prop_oneof![Just(UserRole::Admin), Just(UserRole::User)]
    }

    fn level_strategy() -> impl Strategy<Value = AccessLevel> {
        prop_oneof![
            Just(AccessLevel::Owner),
            Just(AccessLevel::Admin),
            Just(AccessLevel::Member)
        ]
    }

    proptest! {
        #[test]
        fn listing_all_calendars_requires_admin(user_id in 1i64..1000, role in role_strategy()) {
            let decision = can_view_all_calendars(Some(&IdentityClaim::new(user_id, role)));
            if role == UserRole::Admin {
                prop_assert_eq!(decision, AuthzDecision::Allow);
            } else {
                prop_assert_eq!(decision, FORBIDDEN);
            }
        }

        #[test]
        fn view_allowed_iff_member_or_admin(
            user_id in 1i64..20,
            role in role_strategy(),
            members in proptest::collection::btree_map(1i64..20, level_strategy(), 0..8),
        ) {
            let members: Vec<(i64, AccessLevel)> = members.into_iter().collect();
            let calendar = create_calendar(&members);
            let claim = IdentityClaim::new(user_id, role);

            let expected = role == UserRole::Admin || members.iter().any(|(id, _)| *id == user_id);
            prop_assert_eq!(can_view_calendar(Some(&claim), &calendar).is_allowed(), expected);
            prop_assert_eq!(can_mutate_calendar(Some(&claim), &calendar).is_allowed(), expected);
        }
    }
}

pub mod decision;
pub mod engine;
pub mod membership;

pub use decision::{AuthzDecision, DenyReason};
pub use engine::{EventIntent, MutationPolicy, PolicyEngine};
pub use membership::{
    diff_membership, resolve_usernames_to_ids, validate_create_members, MembershipDiff,
    MembershipError, MembershipUpdate, ResolvedMember, UserLookup,
};

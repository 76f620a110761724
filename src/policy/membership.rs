use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::calendar::{AccessLevel, CalendarMembership, MemberInput, ValidationKind};
use crate::storage::store::StoreError;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("{0}")]
    Invalid(ValidationKind),
    #[error("User \"{0}\" not found")]
    UnknownUsername(String),
    #[error("User lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

impl From<ValidationKind> for MembershipError {
    fn from(kind: ValidationKind) -> Self {
        MembershipError::Invalid(kind)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_user_id(&self, username: &str) -> Result<Option<i64>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    pub user_id: i64,
    pub username: String,
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub user_id: i64,
    pub calendar_id: i64,
    pub from: AccessLevel,
    pub to: AccessLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: Vec<CalendarMembership>,
    pub to_update: Vec<MembershipUpdate>,
    pub to_remove: Vec<CalendarMembership>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}

/// Checks run in order: non-empty, every level known, at least one owner.
pub fn validate_create_members(members: &[MemberInput]) -> Result<(), ValidationKind> {
    if members.is_empty() {
        return Err(ValidationKind::MissingMembers);
    }

    if members
        .iter()
        .any(|m| m.access_level.parse::<AccessLevel>().is_err())
    {
        return Err(ValidationKind::InvalidAccessLevel);
    }

    if !members
        .iter()
        .any(|m| m.access_level == AccessLevel::Owner.as_str())
    {
        return Err(ValidationKind::MissingOwner);
    }

    Ok(())
}

/// Resolves usernames one at a time and stops at the first unknown name.
pub async fn resolve_usernames_to_ids<L>(
    members: &[MemberInput],
    lookup: &L,
) -> Result<Vec<ResolvedMember>, MembershipError>
where
    L: UserLookup + ?Sized,
{
    let mut resolved = Vec::with_capacity(members.len());

    for member in members {
        let access_level = member
            .access_level
            .parse::<AccessLevel>()
            .map_err(|_| ValidationKind::InvalidAccessLevel)?;

        let user_id = lookup
            .find_user_id(&member.username)
            .await?
            .ok_or_else(|| MembershipError::UnknownUsername(member.username.clone()))?;

        resolved.push(ResolvedMember {
            user_id,
            username: member.username.clone(),
            access_level,
        });
    }

    Ok(resolved)
}

/// Collapses repeated users. The last entry for a user wins; order of first appearance is kept.
pub fn unique_members(desired: &[ResolvedMember]) -> Vec<ResolvedMember> {
    let mut order: Vec<i64> = Vec::new();
    let mut latest: HashMap<i64, &ResolvedMember> = HashMap::new();

    for member in desired {
        if latest.insert(member.user_id, member).is_none() {
            order.push(member.user_id);
        }
    }

    order
        .into_iter()
        .filter_map(|user_id| latest.get(&user_id).map(|m| (*m).clone()))
        .collect()
}

pub fn ensure_owner(members: &[ResolvedMember]) -> Result<(), ValidationKind> {
    if members.iter().any(|m| m.access_level == AccessLevel::Owner) {
        Ok(())
    } else {
        Err(ValidationKind::MissingOwner)
    }
}

pub fn diff_membership(
    calendar_id: i64,
    existing: &[CalendarMembership],
    desired: &[ResolvedMember],
) -> MembershipDiff {
    let desired = unique_members(desired);
    let desired_levels: HashMap<i64, AccessLevel> = desired
        .iter()
        .map(|m| (m.user_id, m.access_level))
        .collect();

    let mut diff = MembershipDiff::default();

    for member in &desired {
        match existing.iter().find(|e| e.user_id == member.user_id) {
            Some(current) if current.access_level != member.access_level => {
                diff.to_update.push(MembershipUpdate {
                    user_id: member.user_id,
                    calendar_id,
                    from: current.access_level,
                    to: member.access_level,
                });
            }
            Some(_) => {}
            None => diff.to_add.push(CalendarMembership {
                user_id: member.user_id,
                calendar_id,
                access_level: member.access_level,
            }),
        }
    }

    diff.to_remove = existing
        .iter()
        .filter(|e| !desired_levels.contains_key(&e.user_id))
        .cloned()
        .collect();

    diff
}

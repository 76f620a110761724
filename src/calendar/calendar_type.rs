use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::patch::nullable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Owner,
    Admin,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown access level: {0}")]
pub struct UnknownAccessLevel(pub String);

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [AccessLevel::Owner, AccessLevel::Admin, AccessLevel::Member];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Owner => "owner",
            AccessLevel::Admin => "admin",
            AccessLevel::Member => "member",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = UnknownAccessLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownAccessLevel(s.to_string()))
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarMembership {
    pub user_id: i64,
    pub calendar_id: i64,
    pub access_level: AccessLevel,
}

/// Read-only view of a calendar and its member list, as loaded from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: i64,
    #[serde(rename = "calendar_name")]
    pub name: String,
    pub color: Option<String>,
    pub members: Vec<CalendarMembership>,
}

impl Calendar {
    pub fn member(&self, user_id: i64) -> Option<&CalendarMembership> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn has_member(&self, user_id: i64) -> bool {
        self.member(user_id).is_some()
    }

    pub fn owners(&self) -> impl Iterator<Item = &CalendarMembership> {
        self.members
            .iter()
            .filter(|m| m.access_level == AccessLevel::Owner)
    }
}

/// A member as supplied by a client: username plus the raw access level string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInput {
    pub username: String,
    pub access_level: String,
}

impl MemberInput {
    pub fn new(username: impl Into<String>, access_level: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_level: access_level.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCalendar {
    #[serde(rename = "calendar_name")]
    pub name: String,
    pub color: Option<String>,
    #[serde(rename = "users")]
    pub members: Vec<MemberInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarPatch {
    #[serde(rename = "calendar_name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
}

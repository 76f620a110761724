use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Unauthenticated,
    Forbidden,
    NotFound,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::Forbidden => "forbidden",
            DenyReason::NotFound => "not_found",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthzDecision {
    Allow,
    Deny(DenyReason),
}

impl AuthzDecision {
    pub fn allow_if(condition: bool) -> Self {
        if condition {
            AuthzDecision::Allow
        } else {
            AuthzDecision::Deny(DenyReason::Forbidden)
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthzDecision::Allow)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            AuthzDecision::Allow => None,
            AuthzDecision::Deny(reason) => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            AuthzDecision::Allow => Ok(()),
            AuthzDecision::Deny(reason) => Err(reason),
        }
    }
}

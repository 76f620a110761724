use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Structural problems with request input. Callers map these to a 400-equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationKind {
    #[error("At least one user is required")]
    MissingMembers,
    #[error("One or more users have an invalid access_level")]
    InvalidAccessLevel,
    #[error("At least one user must have the role \"owner\"")]
    MissingOwner,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("color must be a hex code like #FF0000")]
    InvalidColor,
    #[error("email is not a valid address")]
    InvalidEmail,
    #[error("end_time must be later than start_time")]
    InvalidTimeRange,
    #[error("category belongs to a different calendar")]
    CategoryCalendarMismatch,
}

impl ValidationKind {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationKind::MissingMembers => "missing_members",
            ValidationKind::InvalidAccessLevel => "invalid_access_level",
            ValidationKind::MissingOwner => "missing_owner",
            ValidationKind::MissingField(_) => "missing_field",
            ValidationKind::InvalidColor => "invalid_color",
            ValidationKind::InvalidEmail => "invalid_email",
            ValidationKind::InvalidTimeRange => "invalid_time_range",
            ValidationKind::CategoryCalendarMismatch => "category_calendar_mismatch",
        }
    }
}

pub fn require_text(value: &str, field: &'static str) -> Result<(), ValidationKind> {
    if value.trim().is_empty() {
        Err(ValidationKind::MissingField(field))
    } else {
        Ok(())
    }
}

pub fn validate_color(color: Option<&str>) -> Result<(), ValidationKind> {
    static COLOR_RE: OnceLock<Regex> = OnceLock::new();
    let regex = COLOR_RE.get_or_init(|| {
        Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("invalid color regex")
    });

    match color {
        Some(value) if !regex.is_match(value) => Err(ValidationKind::InvalidColor),
        _ => Ok(()),
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationKind> {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex")
    });

    if regex.is_match(email) {
        Ok(())
    } else {
        Err(ValidationKind::InvalidEmail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_digit_hex_color() {
        assert!(validate_color(Some("#1a73E8")).is_ok());
    }

    #[test]
    fn missing_color_is_allowed() {
        assert!(validate_color(None).is_ok());
    }

    #[test]
    fn rejects_named_and_short_colors() {
        assert_eq!(validate_color(Some("red")), Err(ValidationKind::InvalidColor));
        assert_eq!(validate_color(Some("#fff")), Err(ValidationKind::InvalidColor));
    }

    #[test]
    fn rejects_email_without_domain() {
        assert_eq!(validate_email("alice@"), Err(ValidationKind::InvalidEmail));
        assert!(validate_email("alice@example.com").is_ok());
    }

    #[test]
    fn blank_text_is_reported_with_field_name() {
        let err = require_text("   ", "calendar_name").unwrap_err();
        assert_eq!(err, ValidationKind::MissingField("calendar_name"));
        assert_eq!(err.to_string(), "calendar_name is required");
    }

    #[test]
    fn membership_codes_match_wire_names() {
        assert_eq!(ValidationKind::MissingMembers.code(), "missing_members");
        assert_eq!(ValidationKind::InvalidAccessLevel.code(), "invalid_access_level");
        assert_eq!(ValidationKind::MissingOwner.code(), "missing_owner");
    }
}

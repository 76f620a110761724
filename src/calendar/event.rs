use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::patch::{apply_nullable, nullable};
use crate::calendar::validation::{require_text, validate_color, ValidationKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub calendar_id: i64,
    pub category_id: Option<i64>,
    #[serde(rename = "event_name")]
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "start_time")]
    pub start: DateTime<Utc>,
    #[serde(rename = "end_time")]
    pub end: DateTime<Utc>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "event_name")]
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "start_time")]
    pub start: DateTime<Utc>,
    #[serde(rename = "end_time")]
    pub end: DateTime<Utc>,
    pub color: Option<String>,
    pub calendar_id: i64,
    pub category_id: Option<i64>,
}

/// `None` keeps a field. For nullable columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(rename = "event_name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(rename = "start_time", default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(rename = "end_time", default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<i64>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventCount {
    pub calendar_id: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub total_events: i64,
    pub per_calendar: Vec<CalendarEventCount>,
}

impl Event {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn validate(&self) -> Result<(), ValidationKind> {
        validate_event_fields(&self.name, self.start, self.end, self.color.as_deref())
    }

    pub fn with_patch(&self, patch: &EventPatch) -> Event {
        Event {
            id: self.id,
            calendar_id: patch.calendar_id.unwrap_or(self.calendar_id),
            category_id: apply_nullable(&patch.category_id, &self.category_id),
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            description: apply_nullable(&patch.description, &self.description),
            start: patch.start.unwrap_or(self.start),
            end: patch.end.unwrap_or(self.end),
            color: apply_nullable(&patch.color, &self.color),
        }
    }
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), ValidationKind> {
        validate_event_fields(&self.name, self.start, self.end, self.color.as_deref())
    }
}

fn validate_event_fields(
    name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    color: Option<&str>,
) -> Result<(), ValidationKind> {
    require_text(name, "event_name")?;
    if end <= start {
        return Err(ValidationKind::InvalidTimeRange);
    }
    validate_color(color)
}

use serde::{Deserialize, Serialize};

use crate::calendar::patch::{apply_nullable, nullable};
use crate::calendar::validation::{require_text, validate_color, ValidationKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    #[serde(rename = "category_name")]
    pub name: String,
    pub color: Option<String>,
    pub calendar_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    #[serde(rename = "category_name")]
    pub name: String,
    pub color: Option<String>,
    pub calendar_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(rename = "category_name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
}

impl Category {
    pub fn with_patch(&self, patch: &CategoryPatch) -> Category {
        Category {
            id: self.id,
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            color: apply_nullable(&patch.color, &self.color),
            calendar_id: self.calendar_id,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationKind> {
        require_text(&self.name, "category_name")?;
        validate_color(self.color.as_deref())
    }
}

impl NewCategory {
    pub fn validate(&self) -> Result<(), ValidationKind> {
        require_text(&self.name, "category_name")?;
        validate_color(self.color.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_category_requires_name() {
        let category = NewCategory {
            name: " ".to_string(),
            color: None,
            calendar_id: 1,
        };

        assert_eq!(category.validate(), Err(ValidationKind::MissingField("category_name")));
    }

    #[test]
    fn patch_keeps_calendar() {
        let category = Category {
            id: 3,
            name: "Work".to_string(),
            color: None,
            calendar_id: 9,
        };
        let patch = CategoryPatch {
            color: Some(Some("#ff0000".to_string())),
            ..CategoryPatch::default()
        };

        let patched = category.with_patch(&patch);

        assert_eq!(patched.calendar_id, 9);
        assert_eq!(patched.name, "Work");
        assert!(patched.validate().is_ok());
    }

    #[test]
    fn null_color_clears_category_color() {
        let category = Category {
            id: 3,
            name: "Work".to_string(),
            color: Some("#ff0000".to_string()),
            calendar_id: 9,
        };
        let patch: CategoryPatch = serde_json::from_str(r#"{"color": null}"#).unwrap();

        assert_eq!(category.with_patch(&patch).color, None);
    }
}

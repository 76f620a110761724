//! Partial-update fields for nullable columns.
//!
//! A missing key deserializes to `None` (keep the stored value), an explicit
//! `null` to `Some(None)` (clear it), and a value to `Some(Some(value))`.

use serde::{Deserialize, Deserializer};

pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn apply_nullable<T: Clone>(change: &Option<Option<T>>, current: &Option<T>) -> Option<T> {
    match change {
        Some(value) => value.clone(),
        None => current.clone(),
    }
}

/// The new value a patch sets, if it sets one. Used for validating colors.
pub fn assigned<T>(change: &Option<Option<T>>) -> Option<&T> {
    change.as_ref().and_then(Option::as_ref)
}

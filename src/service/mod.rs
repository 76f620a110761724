//! Transport-independent handlers. REST controllers and GraphQL resolvers both
//! call into these. Each one authenticates, loads what it needs, asks the policy
//! engine, then touches the store.

pub mod calendar_service;
pub mod category_service;
pub mod error;
pub mod event_service;
pub mod user_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use calendar_service::CalendarService;
pub use category_service::CategoryService;
pub use error::{Resource, ServiceError};
pub use event_service::EventService;
pub use user_service::UserService;

use crate::auth::IdentityClaim;
use crate::calendar::{Calendar, ValidationKind};
use crate::storage::store::Store;

pub(crate) fn authenticated(claim: Option<&IdentityClaim>) -> Result<&IdentityClaim, ServiceError> {
    claim.ok_or(ServiceError::Unauthenticated)
}

pub(crate) fn load_calendar(store: &Store, id: i64) -> Result<Calendar, ServiceError> {
    store
        .load_calendar(id)?
        .ok_or(ServiceError::not_found(Resource::Calendar))
}

/// A category can only be attached to events of its own calendar.
pub(crate) fn check_category(
    store: &Store,
    category_id: Option<i64>,
    calendar_id: i64,
) -> Result<(), ServiceError> {
    let Some(category_id) = category_id else {
        return Ok(());
    };
    let category = store
        .category_by_id(category_id)?
        .ok_or(ServiceError::not_found(Resource::Category))?;
    if category.calendar_id != calendar_id {
        return Err(ValidationKind::CategoryCalendarMismatch.into());
    }
    Ok(())
}

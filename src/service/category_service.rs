use std::sync::Arc;

use crate::auth::IdentityClaim;
use crate::calendar::{Category, CategoryPatch, NewCategory};
use crate::policy::{EventIntent, PolicyEngine};
use crate::service::error::{ensure, Resource, ServiceError};
use crate::service::{authenticated, load_calendar};
use crate::storage::store::Store;

/// Categories live inside a calendar and share its access rules with events.
#[derive(Clone)]
pub struct CategoryService {
    store: Arc<Store>,
    policy: PolicyEngine,
}

impl CategoryService {
    pub fn new(store: Arc<Store>, policy: PolicyEngine) -> Self {
        Self { store, policy }
    }

    pub async fn create(
        &self,
        claim: Option<&IdentityClaim>,
        new_category: NewCategory,
    ) -> Result<Category, ServiceError> {
        authenticated(claim)?;
        self.authorize(claim, new_category.calendar_id, EventIntent::Mutate)?;
        new_category.validate()?;

        let category = self.store.create_category(&new_category)?;
        tracing::info!(
            category_id = category.id,
            calendar_id = category.calendar_id,
            "created category"
        );
        Ok(category)
    }

    pub async fn by_id(&self, claim: Option<&IdentityClaim>, id: i64) -> Result<Category, ServiceError> {
        authenticated(claim)?;
        let category = self.load(id)?;
        self.authorize(claim, category.calendar_id, EventIntent::View)?;
        Ok(category)
    }

    pub async fn for_calendar(
        &self,
        claim: Option<&IdentityClaim>,
        calendar_id: i64,
    ) -> Result<Vec<Category>, ServiceError> {
        authenticated(claim)?;
        self.authorize(claim, calendar_id, EventIntent::View)?;
        Ok(self.store.categories_for_calendar(calendar_id)?)
    }

    pub async fn update(
        &self,
        claim: Option<&IdentityClaim>,
        id: i64,
        patch: CategoryPatch,
    ) -> Result<Category, ServiceError> {
        authenticated(claim)?;
        let current = self.load(id)?;
        self.authorize(claim, current.calendar_id, EventIntent::Mutate)?;

        let updated = current.with_patch(&patch);
        updated.validate()?;
        if !self.store.save_category(&updated)? {
            return Err(ServiceError::not_found(Resource::Category));
        }
        Ok(updated)
    }

    /// Events keep existing; their category reference is cleared.
    pub async fn delete(&self, claim: Option<&IdentityClaim>, id: i64) -> Result<(), ServiceError> {
        authenticated(claim)?;
        let category = self.load(id)?;
        self.authorize(claim, category.calendar_id, EventIntent::Mutate)?;

        if !self.store.delete_category(id)? {
            return Err(ServiceError::not_found(Resource::Category));
        }
        tracing::info!(category_id = id, calendar_id = category.calendar_id, "deleted category");
        Ok(())
    }

    fn load(&self, id: i64) -> Result<Category, ServiceError> {
        self.store
            .category_by_id(id)?
            .ok_or(ServiceError::not_found(Resource::Category))
    }

    fn authorize(
        &self,
        claim: Option<&IdentityClaim>,
        calendar_id: i64,
        intent: EventIntent,
    ) -> Result<(), ServiceError> {
        let calendar = load_calendar(&self.store, calendar_id)?;
        ensure(
            self.policy.can_access_event_via_calendar(claim, &calendar, intent),
            Resource::Category,
        )
    }
}

use std::sync::Arc;

use crate::auth::IdentityClaim;
use crate::calendar::patch::assigned;
use crate::calendar::validation::{require_text, validate_color};
use crate::calendar::{Calendar, CalendarPatch, MemberInput, NewCalendar};
use crate::policy::engine::{can_view_all_calendars, can_view_calendar};
use crate::policy::membership::{
    diff_membership, ensure_owner, resolve_usernames_to_ids, unique_members,
    validate_create_members, ResolvedMember,
};
use crate::policy::PolicyEngine;
use crate::realtime::{DomainEvent, EventBus};
use crate::service::error::{ensure, Resource, ServiceError};
use crate::service::{authenticated, load_calendar};
use crate::storage::store::Store;

#[derive(Clone)]
pub struct CalendarService {
    store: Arc<Store>,
    bus: EventBus,
    policy: PolicyEngine,
}

impl CalendarService {
    pub fn new(store: Arc<Store>, bus: EventBus, policy: PolicyEngine) -> Self {
        Self { store, bus, policy }
    }

    pub async fn my_calendars(&self, claim: Option<&IdentityClaim>) -> Result<Vec<Calendar>, ServiceError> {
        let claim = authenticated(claim)?;
        Ok(self.store.calendars_for_user(claim.user_id)?)
    }

    pub async fn all_calendars(&self, claim: Option<&IdentityClaim>) -> Result<Vec<Calendar>, ServiceError> {
        ensure(can_view_all_calendars(claim), Resource::Calendar)?;
        Ok(self.store.all_calendars()?)
    }

    pub async fn calendar_by_id(
        &self,
        claim: Option<&IdentityClaim>,
        id: i64,
    ) -> Result<Calendar, ServiceError> {
        authenticated(claim)?;
        let calendar = load_calendar(&self.store, id)?;
        ensure(can_view_calendar(claim, &calendar), Resource::Calendar)?;
        Ok(calendar)
    }

    pub async fn create_calendar(
        &self,
        claim: Option<&IdentityClaim>,
        new_calendar: NewCalendar,
    ) -> Result<Calendar, ServiceError> {
        let claim = authenticated(claim)?;
        require_text(&new_calendar.name, "calendar_name")?;
        validate_color(new_calendar.color.as_deref())?;

        let members = self.resolve_members(&new_calendar.members).await?;
        let calendar = self.store.create_calendar_with_members(
            &new_calendar.name,
            new_calendar.color.as_deref(),
            &members,
        )?;

        tracing::info!(
            calendar_id = calendar.id,
            user_id = claim.user_id,
            members = calendar.members.len(),
            "created calendar"
        );
        self.bus.publish(DomainEvent::CalendarCreated(calendar.clone()));
        Ok(calendar)
    }

    pub async fn update_calendar(
        &self,
        claim: Option<&IdentityClaim>,
        id: i64,
        patch: CalendarPatch,
    ) -> Result<Calendar, ServiceError> {
        authenticated(claim)?;
        let calendar = load_calendar(&self.store, id)?;
        ensure(self.policy.can_mutate_calendar(claim, &calendar), Resource::Calendar)?;

        if let Some(name) = &patch.name {
            require_text(name, "calendar_name")?;
        }
        validate_color(assigned(&patch.color).map(String::as_str))?;

        let updated = self
            .store
            .update_calendar(id, &patch)?
            .ok_or(ServiceError::not_found(Resource::Calendar))?;

        tracing::info!(calendar_id = id, "updated calendar");
        self.bus.publish(DomainEvent::CalendarUpdated(updated.clone()));
        Ok(updated)
    }

    /// Replaces the member list. Only the difference is written, in one transaction.
    pub async fn update_members(
        &self,
        claim: Option<&IdentityClaim>,
        id: i64,
        desired: Vec<MemberInput>,
    ) -> Result<Calendar, ServiceError> {
        authenticated(claim)?;
        let calendar = load_calendar(&self.store, id)?;
        ensure(self.policy.can_mutate_calendar(claim, &calendar), Resource::Calendar)?;

        let members = self.resolve_members(&desired).await?;
        let diff = diff_membership(id, &calendar.members, &members);
        if diff.is_empty() {
            return Ok(calendar);
        }

        self.store.apply_membership_changes(&diff)?;
        let updated = load_calendar(&self.store, id)?;

        tracing::info!(
            calendar_id = id,
            added = diff.to_add.len(),
            updated = diff.to_update.len(),
            removed = diff.to_remove.len(),
            "updated calendar members"
        );
        self.bus.publish(DomainEvent::CalendarUpdated(updated.clone()));
        Ok(updated)
    }

    pub async fn delete_calendar(&self, claim: Option<&IdentityClaim>, id: i64) -> Result<(), ServiceError> {
        authenticated(claim)?;
        let calendar = load_calendar(&self.store, id)?;
        ensure(self.policy.can_mutate_calendar(claim, &calendar), Resource::Calendar)?;

        if !self.store.delete_calendar(id)? {
            return Err(ServiceError::not_found(Resource::Calendar));
        }

        tracing::info!(calendar_id = id, "deleted calendar");
        self.bus.publish(DomainEvent::CalendarDeleted(calendar));
        Ok(())
    }

    async fn resolve_members(&self, members: &[MemberInput]) -> Result<Vec<ResolvedMember>, ServiceError> {
        validate_create_members(members)?;
        let resolved = resolve_usernames_to_ids(members, self.store.as_ref()).await?;
        let unique = unique_members(&resolved);
        ensure_owner(&unique)?;
        Ok(unique)
    }
}

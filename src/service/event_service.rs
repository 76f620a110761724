use std::sync::Arc;

use crate::auth::IdentityClaim;
use crate::calendar::{Event, EventPatch, EventStats, NewEvent};
use crate::policy::engine::can_view_event_stats;
use crate::policy::{EventIntent, PolicyEngine};
use crate::realtime::{DomainEvent, EventBus};
use crate::service::error::{ensure, Resource, ServiceError};
use crate::service::{authenticated, check_category, load_calendar};
use crate::storage::store::Store;

#[derive(Clone)]
pub struct EventService {
    store: Arc<Store>,
    bus: EventBus,
    policy: PolicyEngine,
}

impl EventService {
    pub fn new(store: Arc<Store>, bus: EventBus, policy: PolicyEngine) -> Self {
        Self { store, bus, policy }
    }

    pub async fn event_by_id(&self, claim: Option<&IdentityClaim>, id: i64) -> Result<Event, ServiceError> {
        authenticated(claim)?;
        let event = self.load(id)?;
        self.authorize(claim, event.calendar_id, EventIntent::View)?;
        Ok(event)
    }

    pub async fn events_for_calendar(
        &self,
        claim: Option<&IdentityClaim>,
        calendar_id: i64,
    ) -> Result<Vec<Event>, ServiceError> {
        authenticated(claim)?;
        self.authorize(claim, calendar_id, EventIntent::View)?;
        Ok(self.store.events_for_calendar(calendar_id)?)
    }

    pub async fn create_event(
        &self,
        claim: Option<&IdentityClaim>,
        new_event: NewEvent,
    ) -> Result<Event, ServiceError> {
        authenticated(claim)?;
        self.authorize(claim, new_event.calendar_id, EventIntent::Mutate)?;
        new_event.validate()?;
        check_category(&self.store, new_event.category_id, new_event.calendar_id)?;

        let event = self.store.create_event(&new_event)?;
        tracing::info!(
            event_id = event.id,
            calendar_id = event.calendar_id,
            "created event"
        );
        self.bus.publish(DomainEvent::EventCreated(event.clone()));
        Ok(event)
    }

    pub async fn update_event(
        &self,
        claim: Option<&IdentityClaim>,
        id: i64,
        patch: EventPatch,
    ) -> Result<Event, ServiceError> {
        authenticated(claim)?;
        let current = self.load(id)?;
        self.authorize(claim, current.calendar_id, EventIntent::Mutate)?;

        let updated = current.with_patch(&patch);
        if updated.calendar_id != current.calendar_id {
            self.authorize(claim, updated.calendar_id, EventIntent::Mutate)?;
        }
        updated.validate()?;
        check_category(&self.store, updated.category_id, updated.calendar_id)?;

        if !self.store.save_event(&updated)? {
            return Err(ServiceError::not_found(Resource::Event));
        }
        tracing::info!(event_id = id, calendar_id = updated.calendar_id, "updated event");
        Ok(updated)
    }

    pub async fn delete_event(&self, claim: Option<&IdentityClaim>, id: i64) -> Result<(), ServiceError> {
        authenticated(claim)?;
        let event = self.load(id)?;
        self.authorize(claim, event.calendar_id, EventIntent::Mutate)?;

        if !self.store.delete_event(id)? {
            return Err(ServiceError::not_found(Resource::Event));
        }
        tracing::info!(event_id = id, calendar_id = event.calendar_id, "deleted event");
        Ok(())
    }

    pub async fn event_stats(&self, claim: Option<&IdentityClaim>) -> Result<EventStats, ServiceError> {
        ensure(can_view_event_stats(claim), Resource::Event)?;
        Ok(self.store.event_stats()?)
    }

    fn load(&self, id: i64) -> Result<Event, ServiceError> {
        self.store
            .event_by_id(id)?
            .ok_or(ServiceError::not_found(Resource::Event))
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
            Resource::Event,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{AccessLevel, NewCategory, ValidationKind};
    use crate::policy::MutationPolicy;
    use crate::realtime::Topic;
    use crate::service::test_support::{resolved, Fixture};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn create_service(fixture: &Fixture) -> (EventService, EventBus) {
        let bus = EventBus::new(16);
        let service = EventService::new(fixture.store.clone(), bus.clone(), PolicyEngine::default());
        (service, bus)
    }

    fn new_event(calendar_id: i64) -> NewEvent {
        NewEvent {
            name: "Dentist".to_string(),
            description: Some("Bring the forms".to_string()),
            start: start(),
            end: start() + Duration::hours(1),
            color: None,
            calendar_id,
            category_id: None,
        }
    }

    #[tokio::test]
    async fn member_creates_event_and_it_is_published() {
        let fixture = Fixture::new();
        let (service, bus) = create_service(&fixture);
        let mut created = bus.subscribe(Topic::EventCreated);

        let event = service
            .create_event(Some(&Fixture::claim(&fixture.bob)), new_event(fixture.calendar.id))
            .await
            .unwrap();

        assert_eq!(event.duration_minutes(), 60);
        assert_eq!(created.next().await, Some(DomainEvent::EventCreated(event)));
    }

    #[tokio::test]
    async fn outsider_cannot_create_or_read_events() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);
        let outsider = Fixture::claim(&fixture.carol);

        let created = service.create_event(Some(&outsider), new_event(fixture.calendar.id)).await;
        let listed = service.events_for_calendar(Some(&outsider), fixture.calendar.id).await;

        assert!(matches!(created, Err(ServiceError::Forbidden)));
        assert!(matches!(listed, Err(ServiceError::Forbidden)));
    }

    #[tokio::test]
    async fn event_in_missing_calendar_is_not_found() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);

        let result = service
            .create_event(Some(&Fixture::claim(&fixture.carol)), new_event(777))
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::NotFound { resource: Resource::Calendar })
        ));
    }

    #[tokio::test]
    async fn end_must_follow_start() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);
        let mut event = new_event(fixture.calendar.id);
        event.end = event.start;

        let result = service.create_event(Some(&Fixture::claim(&fixture.alice)), event).await;

        let Err(err) = result else {
            panic!("zero-length event was accepted");
        };
        assert_eq!(err.to_string(), "end_time must be later than start_time");
        assert!(matches!(err, ServiceError::Validation(ValidationKind::InvalidTimeRange)));
    }

    #[tokio::test]
    async fn category_from_another_calendar_is_rejected() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);
        let other = fixture
            .store
            .create_calendar_with_members("Work", None, &[resolved(&fixture.carol, AccessLevel::Owner)])
            .unwrap();
        let category = fixture
            .store
            .create_category(&NewCategory {
                name: "Meetings".to_string(),
                color: None,
                calendar_id: other.id,
            })
            .unwrap();
        let mut event = new_event(fixture.calendar.id);
        event.category_id = Some(category.id);

        let result = service.create_event(Some(&Fixture::claim(&fixture.alice)), event).await;

        assert!(matches!(
            result,
            Err(ServiceError::Validation(ValidationKind::CategoryCalendarMismatch))
        ));
    }

    #[tokio::test]
    async fn moving_event_requires_access_to_target_calendar() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);
        let alice = Fixture::claim(&fixture.alice);
        let event = service
            .create_event(Some(&alice), new_event(fixture.calendar.id))
            .await
            .unwrap();
        let carols = fixture
            .store
            .create_calendar_with_members("Carol", None, &[resolved(&fixture.carol, AccessLevel::Owner)])
            .unwrap();

        let result = service
            .update_event(
                Some(&alice),
                event.id,
                EventPatch {
                    calendar_id: Some(carols.id),
                    ..EventPatch::default()
                },
            )
            .await;

        assert!(matches!(result, Err(ServiceError::Forbidden)));
        assert_eq!(fixture.store.event_by_id(event.id).unwrap(), Some(event));
    }

    #[tokio::test]
    async fn categorised_event_moves_once_category_is_cleared() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);
        let alice = Fixture::claim(&fixture.alice);
        let category = fixture
            .store
            .create_category(&NewCategory {
                name: "Health".to_string(),
                color: None,
                calendar_id: fixture.calendar.id,
            })
            .unwrap();
        let mut new = new_event(fixture.calendar.id);
        new.category_id = Some(category.id);
        let event = service.create_event(Some(&alice), new).await.unwrap();
        let personal = fixture
            .store
            .create_calendar_with_members("Personal", None, &[resolved(&fixture.alice, AccessLevel::Owner)])
            .unwrap();

        let keeping_category = service
            .update_event(
                Some(&alice),
                event.id,
                EventPatch {
                    calendar_id: Some(personal.id),
                    ..EventPatch::default()
                },
            )
            .await;
        let clear_and_move: EventPatch = serde_json::from_value(serde_json::json!({
            "calendar_id": personal.id,
            "category_id": null,
            "description": null,
        }))
        .unwrap();
        let moved = service
            .update_event(Some(&alice), event.id, clear_and_move)
            .await
            .unwrap();

        assert!(matches!(
            keeping_category,
            Err(ServiceError::Validation(ValidationKind::CategoryCalendarMismatch))
        ));
        assert_eq!(moved.calendar_id, personal.id);
        assert_eq!(moved.category_id, None);
        assert_eq!(moved.description, None);
        assert_eq!(fixture.store.event_by_id(event.id).unwrap(), Some(moved));
    }

    #[tokio::test]
    async fn update_event_persists_patch() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);
        let bob = Fixture::claim(&fixture.bob);
        let event = service
            .create_event(Some(&bob), new_event(fixture.calendar.id))
            .await
            .unwrap();

        let updated = service
            .update_event(
                Some(&bob),
                event.id,
                EventPatch {
                    name: Some("Orthodontist".to_string()),
                    end: Some(start() + Duration::minutes(90)),
                    ..EventPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Orthodontist");
        assert_eq!(updated.duration_minutes(), 90);
        assert_eq!(
            service.event_by_id(Some(&bob), event.id).await.unwrap(),
            updated
        );
    }

    #[tokio::test]
    async fn strict_policy_blocks_member_deletes() {
        let fixture = Fixture::new();
        let bus = EventBus::new(4);
        let service = EventService::new(
            fixture.store.clone(),
            bus,
            PolicyEngine::new(MutationPolicy::OwnerOrAdmin),
        );
        let event = service
            .create_event(Some(&Fixture::claim(&fixture.alice)), new_event(fixture.calendar.id))
            .await
            .unwrap();

        let by_member = service.delete_event(Some(&Fixture::claim(&fixture.bob)), event.id).await;
        let by_owner = service.delete_event(Some(&Fixture::claim(&fixture.alice)), event.id).await;

        assert!(matches!(by_member, Err(ServiceError::Forbidden)));
        assert!(by_owner.is_ok());
        assert_eq!(fixture.store.event_by_id(event.id).unwrap(), None);
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);

        let result = service.event_by_id(Some(&Fixture::claim(&fixture.root)), 404).await;

        assert!(matches!(result, Err(ServiceError::NotFound { resource: Resource::Event })));
    }

    #[tokio::test]
    async fn stats_are_admin_only() {
        let fixture = Fixture::new();
        let (service, _) = create_service(&fixture);
        let alice = Fixture::claim(&fixture.alice);
        for _ in 0..3 {
            service
                .create_event(Some(&alice), new_event(fixture.calendar.id))
                .await
                .unwrap();
        }

        let as_user = service.event_stats(Some(&alice)).await;
        let stats = service
            .event_stats(Some(&Fixture::claim(&fixture.root)))
            .await
            .unwrap();

        assert!(matches!(as_user, Err(ServiceError::Forbidden)));
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.per_calendar.len(), 1);
        assert_eq!(stats.per_calendar[0].calendar_id, fixture.calendar.id);
    }
}

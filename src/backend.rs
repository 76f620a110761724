use std::sync::Arc;

use crate::auth::{IdentityClaim, TokenService, TokenSigner};
use crate::policy::PolicyEngine;
use crate::realtime::EventBus;
use crate::service::{CalendarService, CategoryService, EventService, UserService};
use crate::storage::config::Config;
use crate::storage::store::{Store, StoreError};

/// Everything a transport needs, wired once from [`Config`].
#[derive(Clone)]
pub struct Backend {
    store: Arc<Store>,
    bus: EventBus,
    tokens: TokenService,
    calendars: CalendarService,
    events: EventService,
    categories: CategoryService,
    users: UserService,
}

impl Backend {
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = Store::open(&config.database.path)?;
        tracing::info!(path = %config.database.path.display(), "opened database");
        Ok(Self::assemble(Arc::new(store), config))
    }

    pub fn assemble(store: Arc<Store>, config: &Config) -> Self {
        let bus = EventBus::new(config.realtime.channel_capacity);
        let policy = PolicyEngine::new(config.calendars.mutation_policy);
        let tokens = TokenService::new(TokenSigner::from_config(&config.auth), store.clone());

        Self {
            calendars: CalendarService::new(store.clone(), bus.clone(), policy),
            events: EventService::new(store.clone(), bus.clone(), policy),
            categories: CategoryService::new(store.clone(), policy),
            users: UserService::new(store.clone(), config.auth.password_cost),
            tokens,
            bus,
            store,
        }
    }

    /// Resolves a bearer token into a claim. Bad tokens count as anonymous.
    pub fn identify(&self, access_token: Option<&str>) -> Option<IdentityClaim> {
        let raw = access_token?;
        match self.tokens.verify_access(raw) {
            Ok(claim) => Some(claim),
            Err(err) => {
                tracing::warn!(reason = %err, "rejected access token");
                None
            }
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn calendars(&self) -> &CalendarService {
        &self.calendars
    }

    pub fn events(&self) -> &EventService {
        &self.events
    }

    pub fn categories(&self) -> &CategoryService {
        &self.categories
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }
}

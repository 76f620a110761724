use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::calendar::{Calendar, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    CalendarCreated,
    CalendarUpdated,
    CalendarDeleted,
    EventCreated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    CalendarCreated(Calendar),
    CalendarUpdated(Calendar),
    CalendarDeleted(Calendar),
    EventCreated(Event),
}

impl DomainEvent {
    pub fn topic(&self) -> Topic {
        match self {
            DomainEvent::CalendarCreated(_) => Topic::CalendarCreated,
            DomainEvent::CalendarUpdated(_) => Topic::CalendarUpdated,
            DomainEvent::CalendarDeleted(_) => Topic::CalendarDeleted,
            DomainEvent::EventCreated(_) => Topic::EventCreated,
        }
    }
}

/// Fan-out relay for subscription transports. Delivery is best effort: slow
/// subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers the event reached.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(?topic, receivers, "published event");
                receivers
            }
            Err(_) => {
                tracing::debug!(?topic, "no subscribers for event");
                0
            }
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        Subscription {
            topic,
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<DomainEvent>,
}

impl Subscription {
    /// Waits for the next event on this subscription's topic. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.topic() == self.topic => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = ?self.topic, skipped, "subscriber lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

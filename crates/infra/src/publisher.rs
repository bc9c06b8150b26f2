//! Best-effort event publication.
//!
//! Business writes commit first; publishing happens afterwards and a failed
//! publish never undoes or fails the write. Failures are logged at `warn`.

use tracing::{debug, warn};

use bookstore_events::{DomainEvent, Event, EventBus, EventEnvelope};

/// Message type carried on the bus between services.
pub type DomainEnvelope = EventEnvelope<DomainEvent>;

#[derive(Debug, Clone)]
pub struct EventPublisher<B> {
    bus: B,
}

impl<B> EventPublisher<B>
where
    B: EventBus<DomainEnvelope>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish under the event's own topic, reporting failure to the caller.
    pub fn try_publish(&self, event: DomainEvent) -> Result<(), B::Error> {
        let envelope = EventEnvelope::wrap(event);
        let event_id = envelope.event_id();
        let topic = envelope.topic().to_string();

        self.bus.publish(&topic, envelope)?;
        debug!(%event_id, topic = %topic, "event published");
        Ok(())
    }

    /// Publish and swallow failure. Returns whether the bus accepted the event.
    pub fn publish(&self, event: DomainEvent) -> bool {
        let topic = event.event_type();
        match self.try_publish(event) {
            Ok(()) => true,
            Err(err) => {
                warn!(topic, error = %err, "event publish failed; write already committed");
                false
            }
        }
    }

    /// Publish a batch in order; returns how many were accepted.
    pub fn publish_all(&self, events: impl IntoIterator<Item = DomainEvent>) -> usize {
        events.into_iter().map(|e| self.publish(e)).filter(|ok| *ok).count()
    }
}

use crate::{Event, EventEnvelope};

/// A projection builds a read model by folding a stream of events.
///
/// Read models are **derived and disposable**: they can be cleared and rebuilt
/// by replaying events, and they are never the source of truth for a
/// correctness-critical decision.
///
/// ## Delivery tolerance
///
/// Events arrive at-least-once and possibly out of order across topics.
/// Implementations must keep their state valid under duplicates and reordering
/// (e.g. clamp derived counters instead of letting them go negative). Events
/// that cannot be applied yet are dropped, not buffered.
///
/// `apply` takes `&self`: projections are shared between the worker that feeds
/// them and the service that queries them, so the read model sits behind its
/// own synchronization.
pub trait Projection: Send + Sync {
    type Ev: Event;

    /// Apply a single event to the read model.
    fn apply(&self, envelope: &EventEnvelope<Self::Ev>);

    /// Drop all derived state.
    fn reset(&self);

    /// Rebuild the read model from scratch by replaying `envelopes` in order.
    fn rebuild<'a>(&self, envelopes: impl IntoIterator<Item = &'a EventEnvelope<Self::Ev>>)
    where
        Self::Ev: 'a,
        Self: Sized,
    {
        self.reset();
        for envelope in envelopes {
            self.apply(envelope);
        }
    }
}

/// Execute an aggregate command deterministically (no IO, no async).
///
/// 1. **Decide**: calls `aggregate.handle(command)` to get events (pure, no mutation)
/// 2. **Evolve**: applies each event to the aggregate via `aggregate.apply(event)`
///
/// The aggregate is mutated in place only when the decision succeeds; on error it
/// is left untouched. Persisting the new state and publishing the returned
/// events is the caller's job.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> bookstore_core::DomainResult<Vec<A::Event>>
where
    A: bookstore_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}

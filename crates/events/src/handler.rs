/// Execute an aggregate command deterministically (no IO, no async).
///
/// 1. **Decide**: `aggregate.handle(command)` produces events without mutation.
/// 2. **Evolve**: each event is applied to the aggregate.
///
/// On error the aggregate is untouched. The returned events are what reactions
/// (e.g. stock movements on shipment) consume; an empty vector means the command
/// was an idempotent no-op.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: atelier_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}

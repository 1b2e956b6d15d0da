/// Errors surfaced by the evaluation core.
///
/// Nothing here is fatal to the process: ring errors exclude a rule for one
/// planning cycle, store errors skip starting one worker, and both self-heal
/// on the next cycle.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The hash ring has no members; no rule can be placed.
    #[error("Engine: hash ring has no members")]
    EmptyRing,

    /// The active-event store could not be read while seeding a worker.
    #[error("Engine: active-event store error: {0}")]
    Store(String),
}

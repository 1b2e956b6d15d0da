//! Read-only snapshot caches consumed by the evaluation core.
//!
//! Each cache holds an in-memory snapshot that an external refresh cycle
//! replaces wholesale via `replace_all`; the evaluation core only ever
//! reads. Readers run concurrently from any number of worker tasks, so the
//! snapshots sit behind `RwLock`s and hand out `Arc`s rather than clones.

pub mod mutes;
pub mod rules;
pub mod targets;

pub use mutes::MuteCache;
pub use rules::RuleCache;
pub use targets::TargetCache;

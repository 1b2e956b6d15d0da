//! In-memory active-event store.

use std::collections::HashMap;
use std::sync::RwLock;

use vigil_common::types::AlertEvent;

use crate::error::EngineError;
use crate::ActiveEventStore;

/// Holds the currently active events per rule in memory. Deployments that
/// persist their event log back this trait with the database instead; the
/// engine only ever reads it, at worker startup.
#[derive(Default)]
pub struct MemoryActiveEventStore {
    events: RwLock<HashMap<i64, Vec<AlertEvent>>>,
}

impl MemoryActiveEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored active events for one rule; called by the
    /// embedding process's event logging.
    pub fn put(&self, rule_id: i64, active: Vec<AlertEvent>) {
        let mut events = self.events.write().unwrap_or_else(|p| p.into_inner());
        events.insert(rule_id, active);
    }
}

impl ActiveEventStore for MemoryActiveEventStore {
    fn active_events(&self, rule_id: i64) -> Result<Vec<AlertEvent>, EngineError> {
        let events = self.events.read().unwrap_or_else(|p| p.into_inner());
        Ok(events.get(&rule_id).cloned().unwrap_or_default())
    }
}

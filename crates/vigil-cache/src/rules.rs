use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vigil_common::types::AlertRule;

/// Snapshot of all alert-rule definitions, keyed by rule id.
#[derive(Default)]
pub struct RuleCache {
    rules: RwLock<HashMap<i64, Arc<AlertRule>>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<Arc<AlertRule>> {
        let rules = self.rules.read().unwrap_or_else(|p| p.into_inner());
        rules.get(&id).cloned()
    }

    /// All rule ids in ascending order.
    pub fn rule_ids(&self) -> Vec<i64> {
        let rules = self.rules.read().unwrap_or_else(|p| p.into_inner());
        let mut ids: Vec<i64> = rules.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Swap in a fresh snapshot; called by the external refresh cycle.
    pub fn replace_all(&self, snapshot: Vec<AlertRule>) {
        let count = snapshot.len();
        let map: HashMap<i64, Arc<AlertRule>> =
            snapshot.into_iter().map(|r| (r.id, Arc::new(r))).collect();
        let mut rules = self.rules.write().unwrap_or_else(|p| p.into_inner());
        *rules = map;
        tracing::debug!(count, "rule cache refreshed");
    }

    pub fn len(&self) -> usize {
        let rules = self.rules.read().unwrap_or_else(|p| p.into_inner());
        rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use vigil_common::types::MuteRule;

/// Snapshot of active mute rules.
#[derive(Default)]
pub struct MuteCache {
    mutes: RwLock<Vec<Arc<MuteRule>>>,
}

impl MuteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any mute suppresses an event candidate. Only the rule id, the
    /// candidate's tag map and its trigger time participate.
    pub fn is_muted(&self, rule_id: i64, tags: &BTreeMap<String, String>, ts: i64) -> bool {
        let mutes = self.mutes.read().unwrap_or_else(|p| p.into_inner());
        mutes.iter().any(|m| m.matches(rule_id, tags, ts))
    }

    pub fn replace_all(&self, snapshot: Vec<MuteRule>) {
        let count = snapshot.len();
        let list: Vec<Arc<MuteRule>> = snapshot.into_iter().map(Arc::new).collect();
        let mut mutes = self.mutes.write().unwrap_or_else(|p| p.into_inner());
        *mutes = list;
        tracing::debug!(count, "mute cache refreshed");
    }
}

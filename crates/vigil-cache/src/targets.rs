use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vigil_common::types::Target;

/// Snapshot of monitored-target metadata, keyed by the target's ident.
#[derive(Default)]
pub struct TargetCache {
    targets: RwLock<HashMap<String, Arc<Target>>>,
}

impl TargetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ident: &str) -> Option<Arc<Target>> {
        let targets = self.targets.read().unwrap_or_else(|p| p.into_inner());
        targets.get(ident).cloned()
    }

    pub fn replace_all(&self, snapshot: Vec<Target>) {
        let count = snapshot.len();
        let map: HashMap<String, Arc<Target>> = snapshot
            .into_iter()
            .map(|t| (t.ident.clone(), Arc::new(t)))
            .collect();
        let mut targets = self.targets.write().unwrap_or_else(|p| p.into_inner());
        *targets = map;
        tracing::debug!(count, "target cache refreshed");
    }
}

//! Worker lifecycle: reconciles the running worker set against the shard
//! planner's output.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vigil_common::hash::rule_fingerprint;
use vigil_common::types::{AlertEvent, AlertRule};

use crate::worker::RuleEval;
use crate::{ActiveEventStore, EngineContext};

struct WorkerHandle {
    rule_id: i64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the running per-rule workers, keyed by rule fingerprint. The map is
/// mutated only under the lock by `reconcile` and `shutdown`; workers
/// themselves never touch it.
pub struct WorkerPool {
    ctx: Arc<EngineContext>,
    store: Arc<dyn ActiveEventStore>,
    cancel: CancellationToken,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl WorkerPool {
    pub fn new(
        ctx: Arc<EngineContext>,
        store: Arc<dyn ActiveEventStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            store,
            cancel,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Bring the running set in line with the owned rule ids.
    ///
    /// Workers whose fingerprint left the set get a cooperative stop signal;
    /// new fingerprints are seeded from the active-event store and spawned.
    /// Fingerprints present on both sides are left untouched; their rule
    /// snapshot refreshes lazily inside the worker's own judging pass.
    /// Running this twice with the same input changes nothing.
    pub fn reconcile(&self, owned: &[i64]) {
        let mut desired: HashMap<String, Arc<AlertRule>> = HashMap::new();
        for id in owned {
            // A rule deleted between planning and reconciliation is nothing
            // to do.
            if let Some(rule) = self.ctx.rules.get(*id) {
                desired.insert(rule_fingerprint(&rule), rule);
            }
        }

        let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());

        workers.retain(|fingerprint, handle| {
            if desired.contains_key(fingerprint) {
                return true;
            }
            tracing::info!(rule_id = handle.rule_id, "stopping rule worker");
            handle.cancel.cancel();
            false
        });

        for (fingerprint, rule) in desired {
            if workers.contains_key(&fingerprint) {
                continue;
            }

            let seed = match self.store.active_events(rule.id) {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!(
                        rule_id = rule.id,
                        error = %e,
                        "failed to load active events, skipping worker this cycle"
                    );
                    continue;
                }
            };
            let firing: HashMap<String, AlertEvent> =
                seed.into_iter().map(|e| (e.hash.clone(), e)).collect();

            tracing::info!(
                rule_id = rule.id,
                restored = firing.len(),
                "starting rule worker"
            );
            let rule_id = rule.id;
            let cancel = self.cancel.child_token();
            let worker = RuleEval::new(rule, firing, self.ctx.clone(), cancel.clone());
            let task = tokio::spawn(worker.run());
            workers.insert(
                fingerprint,
                WorkerHandle {
                    rule_id,
                    cancel,
                    task,
                },
            );
        }
    }

    pub fn worker_count(&self) -> usize {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        workers.len()
    }

    /// Rule ids with a running worker, ascending.
    pub fn worker_rule_ids(&self) -> Vec<i64> {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        let mut ids: Vec<i64> = workers.values().map(|h| h.rule_id).collect();
        ids.sort_unstable();
        ids
    }

    /// Signal every worker to stop and wait for each to finish its current
    /// cycle.
    pub async fn shutdown(&self) {
        let handles: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            workers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            if let Err(e) = handle.task.await {
                tracing::error!(rule_id = handle.rule_id, error = %e, "worker task failed");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn fingerprints(&self) -> Vec<String> {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        let mut fps: Vec<String> = workers.keys().cloned().collect();
        fps.sort();
        fps
    }

    #[cfg(test)]
    pub(crate) fn worker_token(&self, fingerprint: &str) -> Option<CancellationToken> {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        workers.get(fingerprint).map(|h| h.cancel.clone())
    }
}

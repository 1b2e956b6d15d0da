//! Periodic shard planning: which rules does this node own right now.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use vigil_cache::RuleCache;

use crate::config::EngineConfig;
use crate::pool::WorkerPool;
use crate::ring::HashRing;

/// Recomputes the locally owned rule set on a fixed period and hands it to
/// the worker pool. Purely derived state: the same ring membership and rule
/// set always produce the same assignment.
pub struct ShardPlanner {
    rules: Arc<RuleCache>,
    ring: Arc<HashRing>,
    pool: Arc<WorkerPool>,
    node_name: String,
    startup_delay: Duration,
    period: Duration,
    cancel: CancellationToken,
}

impl ShardPlanner {
    pub fn new(
        rules: Arc<RuleCache>,
        ring: Arc<HashRing>,
        pool: Arc<WorkerPool>,
        config: &EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rules,
            ring,
            pool,
            node_name: config.node_name.clone(),
            startup_delay: Duration::from_secs(config.startup_delay_secs),
            period: Duration::from_secs(config.reconcile_interval_secs.max(1)),
            cancel,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            node = %self.node_name,
            startup_delay_secs = self.startup_delay.as_secs(),
            period_secs = self.period.as_secs(),
            "shard planner started"
        );

        // Let the caches warm before the first planning pass.
        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(self.startup_delay) => {}
        }

        let mut tick = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => self.plan(),
            }
        }
        tracing::info!("shard planner stopped");
    }

    /// One planning pass. A failed ring lookup excludes that rule for this
    /// cycle only; the next pass self-heals.
    pub fn plan(&self) {
        let ids = self.rules.rule_ids();
        let mut owned = Vec::with_capacity(ids.len());
        for id in ids {
            match self.ring.get_node(&id.to_string()) {
                Ok(node) if node == self.node_name => owned.push(id),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(rule_id = id, error = %e, "ring lookup failed, skipping rule");
                }
            }
        }
        self.pool.reconcile(&owned);
    }
}

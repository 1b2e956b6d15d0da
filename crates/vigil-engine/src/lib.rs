//! Evaluation core of the Vigil alerting engine.
//!
//! Rules are partitioned across evaluator nodes with a consistent-hash
//! [`ring::HashRing`]; the [`sharding::ShardPlanner`] periodically computes
//! the locally owned rule set and hands it to the [`pool::WorkerPool`],
//! which runs one [`worker::RuleEval`] task per owned rule. Each worker
//! queries the time-series backend on its rule's interval and feeds the
//! results through the pending/firing state machine, emitting alert and
//! recovery events onto the bounded [`queue::EventQueue`].

pub mod config;
pub mod error;
pub mod pool;
pub mod queue;
pub mod ring;
pub mod sharding;
pub mod store;
pub mod worker;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;

use vigil_cache::{MuteCache, RuleCache, TargetCache};
use vigil_common::types::{AlertEvent, Sample};

use crate::error::EngineError;
use crate::queue::EventQueue;

/// Samples and warnings returned by one backend query.
#[derive(Debug)]
pub struct QueryResult {
    pub samples: Vec<Sample>,
    /// Non-empty warnings abort the judging pass; no partial results are
    /// used.
    pub warnings: Vec<String>,
}

/// The time-series query backend. One call per judging pass; the call is the
/// only suspension point inside a pass and is never interrupted by a worker
/// stop.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn query(&self, query: &str, at: i64) -> anyhow::Result<QueryResult>;
}

/// Read access to persisted currently-active events, used to seed a new
/// worker's `firing` map so dedup and recovery survive worker restarts and
/// node churn. The write path is owned by external event logging.
pub trait ActiveEventStore: Send + Sync {
    fn active_events(&self, rule_id: i64) -> Result<Vec<AlertEvent>, EngineError>;
}

/// Shared collaborators handed to every worker.
pub struct EngineContext {
    pub rules: Arc<RuleCache>,
    pub targets: Arc<TargetCache>,
    pub mutes: Arc<MuteCache>,
    pub data_source: Arc<dyn DataSource>,
    pub events: EventQueue,
    /// Fallback for rules with a non-positive evaluation interval.
    pub default_eval_interval_secs: i64,
}

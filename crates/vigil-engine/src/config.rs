use serde::{Deserialize, Serialize};

/// Configuration surface of the evaluation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// This evaluator's identity; must match one of `members`.
    pub node_name: String,
    /// Cluster membership the hash ring is built from.
    pub members: Vec<String>,
    #[serde(default = "default_eval_interval_secs")]
    pub default_eval_interval_secs: i64,
    /// Period of the shard-planning cycle.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Delay before the first planning pass, letting the caches warm.
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_eval_interval_secs() -> i64 {
    10
}

fn default_reconcile_interval_secs() -> u64 {
    9
}

fn default_startup_delay_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    10_000
}

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vigil_cache::{MuteCache, RuleCache, TargetCache};
use vigil_common::hash::rule_fingerprint;
use vigil_common::types::{AlertEvent, AlertRule, MuteRule, Sample, Severity, TagFilter, Target};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pool::WorkerPool;
use crate::queue::{self, EventReceiver};
use crate::ring::HashRing;
use crate::sharding::ShardPlanner;
use crate::store::MemoryActiveEventStore;
use crate::worker::RuleEval;
use crate::{ActiveEventStore, DataSource, EngineContext, QueryResult};

struct EmptyDataSource;

#[async_trait]
impl DataSource for EmptyDataSource {
    async fn query(&self, _query: &str, _at: i64) -> anyhow::Result<QueryResult> {
        Ok(QueryResult {
            samples: vec![],
            warnings: vec![],
        })
    }
}

struct FailingStore;

impl ActiveEventStore for FailingStore {
    fn active_events(&self, _rule_id: i64) -> Result<Vec<AlertEvent>, EngineError> {
        Err(EngineError::Store("event log unreachable".into()))
    }
}

fn rule(id: i64, for_duration_secs: i64) -> AlertRule {
    AlertRule {
        id,
        name: format!("rule-{id}"),
        note: String::new(),
        query: "cpu_usage_active > 90".into(),
        eval_interval_secs: 10,
        for_duration_secs,
        severity: Severity::Warning,
        notify_channels: vec!["webhook-ops".into()],
        notify_groups: vec![],
        callbacks: vec![],
        append_tags: vec![],
        notify_recovered: true,
        notify_repeat_step_mins: 60,
        runbook_url: String::new(),
        enable_stime: String::new(),
        enable_etime: String::new(),
        enable_days_of_week: vec![],
    }
}

fn sample(pairs: &[(&str, &str)], value: f64, ts: i64) -> Sample {
    let labels: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Sample {
        labels,
        value,
        timestamp: ts,
    }
}

fn context(rules: Vec<AlertRule>) -> (Arc<EngineContext>, EventReceiver) {
    let rule_cache = Arc::new(RuleCache::new());
    rule_cache.replace_all(rules);
    let (events, rx) = queue::bounded(64);
    let ctx = Arc::new(EngineContext {
        rules: rule_cache,
        targets: Arc::new(TargetCache::new()),
        mutes: Arc::new(MuteCache::new()),
        data_source: Arc::new(EmptyDataSource),
        events,
        default_eval_interval_secs: 10,
    });
    (ctx, rx)
}

fn worker_for(ctx: &Arc<EngineContext>, id: i64) -> RuleEval {
    let rule = ctx.rules.get(id).expect("rule in cache");
    RuleEval::new(rule, HashMap::new(), ctx.clone(), CancellationToken::new())
}

// ---- judging state machine ----

#[test]
fn zero_for_duration_fires_on_first_pass() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    let mut worker = worker_for(&ctx, 1);

    worker.judge(&[sample(&[("ident", "host1")], 0.123400, 1000)]);

    let event = rx.try_recv().expect("one firing event");
    assert_eq!(event.trigger_value, "0.1234");
    assert!(!event.is_recovered);
    assert_eq!(event.trigger_time, 1000);
    assert!(event.tags.contains(&"ident=host1".to_string()));
    assert!(event.tags_joined.contains("ident=host1"));
    assert_eq!(event.severity, Severity::Warning);
    assert!(rx.try_recv().is_none(), "exactly one event");
    assert_eq!(worker.firing.len(), 1);
    assert!(worker.pending.is_empty());
}

#[test]
fn firing_event_is_not_reemitted() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    let mut worker = worker_for(&ctx, 1);

    let s = sample(&[("ident", "host1")], 95.0, 1000);
    worker.judge(std::slice::from_ref(&s));
    worker.judge(std::slice::from_ref(&s));

    assert!(rx.try_recv().is_some());
    assert!(rx.try_recv().is_none(), "second pass must not re-emit");
    assert_eq!(worker.firing.len(), 1);
}

#[test]
fn absent_series_recovers_once() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    let mut worker = worker_for(&ctx, 1);

    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);
    let fired = rx.try_recv().unwrap();

    worker.judge(&[]);
    let recovered = rx.try_recv().expect("recovery event");
    assert!(recovered.is_recovered);
    assert_eq!(recovered.hash, fired.hash);
    assert!(worker.firing.is_empty());
    assert!(worker.pending.is_empty());
    assert!(rx.try_recv().is_none());

    // a further empty pass stays silent
    worker.judge(&[]);
    assert!(rx.try_recv().is_none());
}

#[test]
fn recovery_suppressed_when_not_requested() {
    let mut r = rule(1, 0);
    r.notify_recovered = false;
    let (ctx, mut rx) = context(vec![r]);
    let mut worker = worker_for(&ctx, 1);

    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);
    let _ = rx.try_recv().unwrap();

    worker.judge(&[]);
    assert!(rx.try_recv().is_none());
    assert!(worker.firing.is_empty());
}

#[test]
fn hysteresis_promotes_once_span_exceeds_window() {
    let (ctx, mut rx) = context(vec![rule(1, 60)]);
    let mut worker = worker_for(&ctx, 1);

    for ts in [1000, 1030, 1050] {
        worker.judge(&[sample(&[("ident", "host1")], 95.0, ts)]);
        assert!(rx.try_recv().is_none(), "span below window at ts={ts}");
        assert_eq!(worker.pending.len(), 1);
    }

    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1070)]);
    let event = rx.try_recv().expect("promotion emits exactly one event");
    assert!(!event.is_recovered);
    assert_eq!(event.trigger_time, 1070);
    assert!(worker.pending.is_empty());
    assert_eq!(worker.firing.len(), 1);

    // staying hot emits nothing further
    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1080)]);
    assert!(rx.try_recv().is_none());
}

#[test]
fn pending_below_window_is_dropped_silently() {
    // interval 10s, window 60s: five passes only span 40s
    let (ctx, mut rx) = context(vec![rule(1, 60)]);
    let mut worker = worker_for(&ctx, 1);

    for ts in [1000, 1010, 1020, 1030, 1040] {
        worker.judge(&[sample(&[("ident", "host1")], 95.0, ts)]);
    }
    assert!(rx.try_recv().is_none());
    assert_eq!(worker.pending.len(), 1);

    worker.judge(&[]);
    assert!(rx.try_recv().is_none(), "pending never fires, never recovers");
    assert!(worker.pending.is_empty());
    assert!(worker.firing.is_empty());
}

#[test]
fn seeded_firing_state_survives_restart() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    let mut first = worker_for(&ctx, 1);
    first.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);
    let _ = rx.try_recv().unwrap();

    // a replacement worker seeded with the persisted firing map neither
    // re-fires nor loses track of recovery
    let seed = first.firing.clone();
    let snapshot = ctx.rules.get(1).unwrap();
    let mut second = RuleEval::new(snapshot, seed, ctx.clone(), CancellationToken::new());

    second.judge(&[sample(&[("ident", "host1")], 95.0, 1010)]);
    assert!(rx.try_recv().is_none(), "seeded event is deduplicated");

    second.judge(&[]);
    let recovered = rx.try_recv().expect("seeded event recovers");
    assert!(recovered.is_recovered);
}

#[test]
fn routing_change_applies_without_restart() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    let mut worker = worker_for(&ctx, 1);

    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.notify_channels, vec!["webhook-ops".to_string()]);

    let mut rerouted = rule(1, 0);
    rerouted.notify_channels = vec!["webhook-oncall".into()];
    assert_eq!(
        rule_fingerprint(&rule(1, 0)),
        rule_fingerprint(&rerouted),
        "routing does not participate in the fingerprint"
    );
    ctx.rules.replace_all(vec![rerouted]);

    worker.judge(&[sample(&[("ident", "host2")], 95.0, 1010)]);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.notify_channels, vec!["webhook-oncall".to_string()]);
}

#[test]
fn deleted_rule_aborts_pass() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    let mut worker = worker_for(&ctx, 1);

    ctx.rules.replace_all(vec![]);
    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);

    assert!(rx.try_recv().is_none());
    assert!(worker.firing.is_empty());
    assert!(worker.pending.is_empty());
}

#[test]
fn muted_sample_is_skipped_entirely() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    ctx.mutes.replace_all(vec![MuteRule {
        id: 1,
        rule_ids: vec![],
        btime: 0,
        etime: 2000,
        filters: vec![TagFilter {
            key: "ident".into(),
            values: vec!["host1".into()],
        }],
    }]);
    let mut worker = worker_for(&ctx, 1);

    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);
    assert!(rx.try_recv().is_none());
    assert!(worker.firing.is_empty());
    assert!(worker.pending.is_empty());
}

#[test]
fn sample_outside_enable_window_is_skipped() {
    use chrono::Datelike;

    let now = chrono::Utc::now();
    let today = now
        .with_timezone(&chrono::Local)
        .weekday()
        .num_days_from_sunday();
    let mut r = rule(1, 0);
    r.enable_days_of_week = vec![(today + 1) % 7];
    let (ctx, mut rx) = context(vec![r]);
    let mut worker = worker_for(&ctx, 1);

    worker.judge(&[sample(&[("ident", "host1")], 95.0, now.timestamp())]);
    assert!(rx.try_recv().is_none());
}

#[test]
fn tags_enriched_from_target_and_rule() {
    let mut r = rule(1, 0);
    r.append_tags = vec!["team=sre".into()];
    let (ctx, mut rx) = context(vec![r]);
    let mut target_tags = BTreeMap::new();
    target_tags.insert("dc".to_string(), "eu-1".to_string());
    ctx.targets.replace_all(vec![Target {
        ident: "host1".into(),
        note: "edge box".into(),
        tags: target_tags,
    }]);
    let mut worker = worker_for(&ctx, 1);

    worker.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.target_ident, "host1");
    assert_eq!(event.target_note, "edge box");
    assert_eq!(
        event.tags,
        vec![
            "dc=eu-1".to_string(),
            "ident=host1".to_string(),
            "team=sre".to_string(),
        ],
        "tags are sorted and deduplicated"
    );
}

// ---- event queue ----

#[test]
fn full_queue_rejects_push_and_keeps_first_event() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);
    let mut worker = worker_for(&ctx, 1);
    worker.judge(&[sample(&[("ident", "host1")], 1.0, 1000)]);
    let first = rx.try_recv().unwrap();
    let mut second = first.clone();
    second.hash = "other".into();

    let (q, mut small_rx) = queue::bounded(1);

    assert!(q.push(first.clone()));
    assert!(!q.push(second), "second push reports failure");

    let drained = small_rx.try_recv().unwrap();
    assert_eq!(drained.hash, first.hash);
    assert!(small_rx.try_recv().is_none());
}

// ---- hash ring & shard planner ----

#[test]
fn ring_lookup_is_deterministic() {
    let a = HashRing::new(["n1", "n2", "n3"]);
    let b = HashRing::new(["n1", "n2", "n3"]);
    for key in 0..200 {
        let key = key.to_string();
        assert_eq!(a.get_node(&key).unwrap(), b.get_node(&key).unwrap());
    }
}

#[test]
fn empty_ring_errors() {
    let ring = HashRing::new(Vec::<String>::new());
    assert!(matches!(ring.get_node("1"), Err(EngineError::EmptyRing)));
}

#[test]
fn removing_a_member_relocates_only_its_keys() {
    let before = HashRing::new(["n1", "n2", "n3"]);
    let after = HashRing::new(["n1", "n2"]);

    let mut moved = 0;
    for key in 0..1000 {
        let key = key.to_string();
        let owner = before.get_node(&key).unwrap();
        if owner == "n3" {
            moved += 1;
            assert_ne!(after.get_node(&key).unwrap(), "n3");
        } else {
            assert_eq!(after.get_node(&key).unwrap(), owner, "surviving keys stay put");
        }
    }
    assert!(moved > 0, "n3 owned some keys");
}

#[tokio::test]
async fn planner_owns_exactly_the_local_shard() {
    let (ctx, _rx) = context((1..=20).map(|id| rule(id, 0)).collect());
    let ring = Arc::new(HashRing::new(["n1", "n2"]));

    let expected: Vec<i64> = (1..=20)
        .filter(|id| ring.get_node(&id.to_string()).unwrap() == "n1")
        .collect();

    let cancel = CancellationToken::new();
    let pool = Arc::new(WorkerPool::new(
        ctx.clone(),
        Arc::new(MemoryActiveEventStore::new()),
        cancel.clone(),
    ));
    let config = EngineConfig {
        node_name: "n1".into(),
        members: vec!["n1".into(), "n2".into()],
        default_eval_interval_secs: 10,
        reconcile_interval_secs: 9,
        startup_delay_secs: 0,
        queue_capacity: 64,
    };
    let planner = ShardPlanner::new(ctx.rules.clone(), ring, pool.clone(), &config, cancel);

    planner.plan();
    assert_eq!(pool.worker_rule_ids(), expected);

    pool.shutdown().await;
    assert_eq!(pool.worker_count(), 0);
}

// ---- worker pool lifecycle ----

fn pool_with(ctx: &Arc<EngineContext>) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(
        ctx.clone(),
        Arc::new(MemoryActiveEventStore::new()),
        CancellationToken::new(),
    ))
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let (ctx, _rx) = context(vec![rule(1, 0), rule(2, 0)]);
    let pool = pool_with(&ctx);

    pool.reconcile(&[1, 2]);
    let fingerprints = pool.fingerprints();
    assert_eq!(fingerprints.len(), 2);
    let token = pool.worker_token(&fingerprints[0]).unwrap();

    pool.reconcile(&[1, 2]);
    assert_eq!(pool.fingerprints(), fingerprints);
    assert!(!token.is_cancelled(), "no worker was restarted");

    pool.shutdown().await;
}

#[tokio::test]
async fn query_change_restarts_worker_but_routing_change_does_not() {
    let (ctx, _rx) = context(vec![rule(1, 0)]);
    let pool = pool_with(&ctx);

    pool.reconcile(&[1]);
    let old_fp = pool.fingerprints()[0].clone();
    let old_token = pool.worker_token(&old_fp).unwrap();

    // routing-only change keeps the fingerprint and the worker
    let mut rerouted = rule(1, 0);
    rerouted.notify_channels = vec!["webhook-oncall".into()];
    ctx.rules.replace_all(vec![rerouted]);
    pool.reconcile(&[1]);
    assert_eq!(pool.fingerprints()[0], old_fp);
    assert!(!old_token.is_cancelled());

    // query change restarts
    let mut rewritten = rule(1, 0);
    rewritten.query = "mem_used_percent > 80".into();
    ctx.rules.replace_all(vec![rewritten]);
    pool.reconcile(&[1]);
    let new_fp = pool.fingerprints()[0].clone();
    assert_ne!(new_fp, old_fp);
    assert!(old_token.is_cancelled(), "old worker was stopped");
    assert_eq!(pool.worker_count(), 1);

    pool.shutdown().await;
}

#[tokio::test]
async fn worker_leaving_the_shard_is_stopped() {
    let (ctx, _rx) = context(vec![rule(1, 0), rule(2, 0)]);
    let pool = pool_with(&ctx);

    pool.reconcile(&[1, 2]);
    assert_eq!(pool.worker_rule_ids(), vec![1, 2]);
    let fp2 = rule_fingerprint(&rule(2, 0));
    let token2 = pool.worker_token(&fp2).unwrap();

    pool.reconcile(&[1]);
    assert_eq!(pool.worker_rule_ids(), vec![1]);
    assert!(token2.is_cancelled(), "evicted worker got the stop signal");
    assert!(pool.worker_token(&fp2).is_none());

    pool.shutdown().await;
}

#[tokio::test]
async fn store_failure_skips_worker_for_the_cycle() {
    let (ctx, _rx) = context(vec![rule(1, 0)]);
    let pool = Arc::new(WorkerPool::new(
        ctx,
        Arc::new(FailingStore),
        CancellationToken::new(),
    ));

    pool.reconcile(&[1]);
    assert_eq!(pool.worker_count(), 0);
}

#[tokio::test]
async fn seeded_worker_recovers_persisted_event_when_series_is_gone() {
    let (ctx, mut rx) = context(vec![rule(1, 0)]);

    // derive a persisted active event by judging once
    let mut scratch = worker_for(&ctx, 1);
    scratch.judge(&[sample(&[("ident", "host1")], 95.0, 1000)]);
    let persisted = rx.try_recv().unwrap();

    let store = Arc::new(MemoryActiveEventStore::new());
    store.put(1, vec![persisted.clone()]);

    let pool = Arc::new(WorkerPool::new(
        ctx,
        store,
        CancellationToken::new(),
    ));
    pool.reconcile(&[1]);

    // the spawned worker's first pass sees no samples and recovers the
    // seeded event
    let recovered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("recovery within first pass")
        .expect("queue open");
    assert!(recovered.is_recovered);
    assert_eq!(recovered.hash, persisted.hash);

    pool.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_workers_cooperatively() {
    let (ctx, _rx) = context(vec![rule(1, 0), rule(2, 0), rule(3, 0)]);
    let pool = pool_with(&ctx);
    pool.reconcile(&[1, 2, 3]);
    assert_eq!(pool.worker_count(), 3);

    tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
        .await
        .expect("workers exit after observing the stop signal");
    assert_eq!(pool.worker_count(), 0);
}

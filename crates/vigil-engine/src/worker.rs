//! Per-rule evaluation worker: scheduling loop and the judging state
//! machine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use vigil_common::hash::event_hash;
use vigil_common::id;
use vigil_common::types::{
    format_trigger_value, tags_to_array, AlertEvent, AlertRule, Sample,
};

use crate::EngineContext;

/// One concurrent task per owned rule. The `pending` and `firing` maps are
/// private to the task and never touched by anything else, so judging needs
/// no locking; an event hash lives in at most one of the two maps at any
/// time.
pub struct RuleEval {
    pub(crate) rule: Arc<AlertRule>,
    pub(crate) firing: HashMap<String, AlertEvent>,
    pub(crate) pending: HashMap<String, AlertEvent>,
    pub(crate) ctx: Arc<EngineContext>,
    cancel: CancellationToken,
}

impl RuleEval {
    /// `firing` is pre-seeded from the persisted active events for this rule
    /// so dedup and recovery survive restarts.
    pub fn new(
        rule: Arc<AlertRule>,
        firing: HashMap<String, AlertEvent>,
        ctx: Arc<EngineContext>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rule,
            firing,
            pending: HashMap::new(),
            ctx,
            cancel,
        }
    }

    pub fn rule_id(&self) -> i64 {
        self.rule.id
    }

    /// Scheduling loop: one judging pass, then sleep for the rule's interval,
    /// observing the stop signal at iteration boundaries only. Transient
    /// failures never terminate the worker; the next scheduled pass is the
    /// retry.
    pub async fn run(mut self) {
        tracing::info!(rule_id = self.rule.id, "rule worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.work().await;

            let mut interval = self.rule.eval_interval_secs;
            if interval <= 0 {
                interval = self.ctx.default_eval_interval_secs;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(interval.max(1) as u64)) => {}
            }
        }
        tracing::info!(rule_id = self.rule.id, "rule worker stopped");
    }

    async fn work(&mut self) {
        let query = self.rule.query.trim().to_string();
        if query.is_empty() {
            tracing::error!(rule_id = self.rule.id, "rule query is blank");
            return;
        }

        let now = chrono::Utc::now().timestamp();
        let result = match self.ctx.data_source.query(&query, now).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(rule_id = self.rule.id, query = %query, error = %e, "query failed");
                return;
            }
        };
        if !result.warnings.is_empty() {
            tracing::error!(
                rule_id = self.rule.id,
                query = %query,
                warnings = ?result.warnings,
                "query returned warnings, skipping pass"
            );
            return;
        }

        self.judge(&result.samples);
    }

    /// One judging pass over the latest query results.
    pub(crate) fn judge(&mut self, samples: &[Sample]) {
        // Routing and notification fields may have changed without a worker
        // restart; re-read the snapshot every pass. A deleted rule aborts
        // the pass.
        let Some(rule) = self.ctx.rules.get(self.rule.id) else {
            return;
        };
        self.rule = rule;

        let now = chrono::Utc::now().timestamp();
        let mut alerting_keys = HashSet::new();

        for sample in samples {
            if !self.rule.is_effective_at(sample.timestamp) {
                continue;
            }

            let mut tags: BTreeMap<String, String> = sample.labels.clone();

            let mut target_ident = String::new();
            let mut target_note = String::new();
            if let Some(ident) = sample.labels.get("ident") {
                target_ident = ident.clone();
                if let Some(target) = self.ctx.targets.get(ident) {
                    target_note = target.note.clone();
                    for (k, v) in &target.tags {
                        tags.insert(k.clone(), v.clone());
                    }
                }
            }

            for tag in &self.rule.append_tags {
                let (k, v) = tag
                    .split_once('=')
                    .expect("append tags are validated as key=value upstream");
                tags.insert(k.to_string(), v.to_string());
            }

            let series_key = sample.series_key();

            if self.ctx.mutes.is_muted(self.rule.id, &tags, sample.timestamp) {
                tracing::info!(rule_id = self.rule.id, series = %series_key, "event muted");
                continue;
            }

            let hash = event_hash(self.rule.id, &series_key);
            alerting_keys.insert(hash.clone());

            let event = self.build_event(sample, tags, target_ident, target_note, hash, now);
            self.handle_new_event(event);
        }

        self.recover_rule(&alerting_keys, now);
    }

    fn build_event(
        &self,
        sample: &Sample,
        tags: BTreeMap<String, String>,
        target_ident: String,
        target_note: String,
        hash: String,
        now: i64,
    ) -> AlertEvent {
        let rule = self.rule.as_ref();
        let tags_arr = tags_to_array(&tags);
        AlertEvent {
            id: id::next_id(),
            hash,
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_note: rule.note.clone(),
            severity: rule.severity,
            for_duration_secs: rule.for_duration_secs,
            query: rule.query.clone(),
            eval_interval_secs: rule.eval_interval_secs,
            callbacks: rule.callbacks.clone(),
            runbook_url: rule.runbook_url.clone(),
            notify_recovered: rule.notify_recovered,
            notify_channels: rule.notify_channels.clone(),
            notify_groups: rule.notify_groups.clone(),
            notify_repeat_next: now + rule.notify_repeat_step_mins * 60,
            target_ident,
            target_note,
            trigger_time: sample.timestamp,
            trigger_value: format_trigger_value(sample.value),
            tags_joined: tags_arr.join(",,"),
            tags: tags_arr,
            is_recovered: false,
            last_eval_time: now,
        }
    }

    /// Hysteresis: an already-firing hash is left alone; a zero "for
    /// duration" fires immediately; otherwise the event is tracked in
    /// `pending` until the span between first and latest observation
    /// exceeds the window, at which point it is promoted and emitted
    /// exactly once.
    fn handle_new_event(&mut self, event: AlertEvent) {
        if self.firing.contains_key(&event.hash) {
            return;
        }

        if event.for_duration_secs == 0 {
            self.push_event(event.clone());
            self.firing.insert(event.hash.clone(), event);
            return;
        }

        let promote = match self.pending.get_mut(&event.hash) {
            Some(tracked) => {
                tracked.last_eval_time = event.trigger_time;
                tracked.last_eval_time - tracked.trigger_time > event.for_duration_secs
            }
            None => {
                self.pending.insert(event.hash.clone(), event.clone());
                false
            }
        };

        if promote {
            self.pending.remove(&event.hash);
            self.push_event(event.clone());
            self.firing.insert(event.hash.clone(), event);
        }
    }

    /// Recovery by absence: a firing hash not seen in this pass is assumed
    /// recovered. There is no way to tell a genuinely cleared condition from
    /// a data-source gap here; both look identical in the query result, and
    /// this policy deliberately treats them the same. Pending hashes that
    /// disappeared are dropped without an event.
    fn recover_rule(&mut self, alerting_keys: &HashSet<String>, now: i64) {
        let recovered: Vec<String> = self
            .firing
            .keys()
            .filter(|hash| !alerting_keys.contains(*hash))
            .cloned()
            .collect();

        for hash in recovered {
            let Some(mut event) = self.firing.remove(&hash) else {
                continue;
            };
            self.pending.remove(&hash);

            if self.rule.notify_recovered {
                event.is_recovered = true;
                event.last_eval_time = now;
                self.push_event(event);
            }
        }

        self.pending
            .retain(|hash, _| alerting_keys.contains(hash));
    }

    fn push_event(&self, event: AlertEvent) {
        tracing::debug!(
            rule_id = event.rule_id,
            hash = %event.hash,
            recovered = event.is_recovered,
            "event queued"
        );
        if !self.ctx.events.push(event) {
            tracing::warn!(rule_id = self.rule.id, "event queue full, dropping event");
        }
    }
}

use chrono::{DateTime, Datelike, Local, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use vigil_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// An alert rule definition as held by the rule cache.
///
/// `id`, `eval_interval_secs` and `query` are the restart-sensitive fields:
/// changing any of them yields a new worker fingerprint and a full worker
/// restart. Every other field is hot-reloadable and picked up by the next
/// judging pass without restarting the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub note: String,
    /// Query text sent verbatim to the time-series backend.
    pub query: String,
    /// Seconds between judging passes; non-positive falls back to the
    /// engine-wide default.
    #[serde(default)]
    pub eval_interval_secs: i64,
    /// Hysteresis window in seconds. Zero fires on the first qualifying pass.
    #[serde(default)]
    pub for_duration_secs: i64,
    pub severity: Severity,
    /// Names of notification channels this rule routes to.
    #[serde(default)]
    pub notify_channels: Vec<String>,
    #[serde(default)]
    pub notify_groups: Vec<String>,
    #[serde(default)]
    pub callbacks: Vec<String>,
    /// Extra `"key=value"` tags stamped onto every event. Entries are
    /// validated upstream; an entry without `=` is a data invariant
    /// violation, not a condition the engine handles.
    #[serde(default)]
    pub append_tags: Vec<String>,
    /// Emit a recovery event when a firing series disappears.
    #[serde(default)]
    pub notify_recovered: bool,
    /// Minutes until the same event may be re-notified.
    #[serde(default)]
    pub notify_repeat_step_mins: i64,
    #[serde(default)]
    pub runbook_url: String,
    /// Start of the daily enable window, `"HH:MM"` local time. Empty means
    /// no lower bound.
    #[serde(default)]
    pub enable_stime: String,
    /// End of the daily enable window, `"HH:MM"` local time. A window whose
    /// start is after its end spans midnight.
    #[serde(default)]
    pub enable_etime: String,
    /// Weekdays the rule is active on, 0 = Sunday .. 6 = Saturday. Empty
    /// means every day.
    #[serde(default)]
    pub enable_days_of_week: Vec<u32>,
}

impl AlertRule {
    /// Whether the rule is scheduled on at `ts` (unix seconds, evaluated in
    /// local time). Samples outside the enable window are skipped by the
    /// judging pass.
    pub fn is_effective_at(&self, ts: i64) -> bool {
        let Some(dt) = DateTime::from_timestamp(ts, 0) else {
            return false;
        };
        let local = dt.with_timezone(&Local);

        if !self.enable_days_of_week.is_empty()
            && !self
                .enable_days_of_week
                .contains(&local.weekday().num_days_from_sunday())
        {
            return false;
        }

        if self.enable_stime.is_empty() || self.enable_etime.is_empty() {
            return true;
        }
        let (Ok(start), Ok(end)) = (
            NaiveTime::parse_from_str(&self.enable_stime, "%H:%M"),
            NaiveTime::parse_from_str(&self.enable_etime, "%H:%M"),
        ) else {
            // Unparseable window: treat the rule as always on rather than
            // silently never evaluating it.
            return true;
        };

        window_contains(start, end, local.time())
    }
}

/// Daily time-window membership; a window whose start is after its end wraps
/// past midnight, and a degenerate window (start == end) is always active.
pub fn window_contains(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
    if start < end {
        t >= start && t <= end
    } else if start > end {
        t >= start || t <= end
    } else {
        true
    }
}

/// One labeled value returned by the query backend for an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    /// Unix seconds.
    pub timestamp: i64,
}

impl Sample {
    /// Deterministic identity of the series this sample belongs to: the
    /// sorted `key=value` label pairs joined with `,`. Two samples from the
    /// same series always produce the same key.
    pub fn series_key(&self) -> String {
        let pairs: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        pairs.join(",")
    }
}

/// Target metadata used to enrich events whose samples carry an `ident`
/// label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub ident: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A tag filter inside a mute rule: the event tag `key` must hold one of
/// `values` for the filter to match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    pub values: Vec<String>,
}

/// A suppression rule: events matching every tag filter inside the time
/// window are dropped before hysteresis tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRule {
    pub id: i64,
    /// Rule ids this mute applies to; empty applies to all rules.
    #[serde(default)]
    pub rule_ids: Vec<i64>,
    /// Window start, unix seconds.
    pub btime: i64,
    /// Window end, unix seconds.
    pub etime: i64,
    #[serde(default)]
    pub filters: Vec<TagFilter>,
}

impl MuteRule {
    /// Mute matching needs only the rule id, the candidate tag map and the
    /// trigger timestamp; no other event fields are consulted.
    pub fn matches(&self, rule_id: i64, tags: &BTreeMap<String, String>, ts: i64) -> bool {
        if !self.rule_ids.is_empty() && !self.rule_ids.contains(&rule_id) {
            return false;
        }
        if ts < self.btime || ts > self.etime {
            return false;
        }
        self.filters
            .iter()
            .all(|f| tags.get(&f.key).is_some_and(|v| f.values.contains(v)))
    }
}

/// A firing or recovery occurrence derived from one judged sample.
///
/// Immutable once pushed to the event queue; while pending, only
/// `last_eval_time` is updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    /// Deduplication key: hash of the rule id and the sample's series key.
    pub hash: String,
    pub rule_id: i64,
    pub rule_name: String,
    pub rule_note: String,
    pub severity: Severity,
    pub for_duration_secs: i64,
    pub query: String,
    pub eval_interval_secs: i64,
    pub callbacks: Vec<String>,
    pub runbook_url: String,
    pub notify_recovered: bool,
    pub notify_channels: Vec<String>,
    pub notify_groups: Vec<String>,
    /// Unix seconds after which this event may be re-notified.
    pub notify_repeat_next: i64,
    pub target_ident: String,
    pub target_note: String,
    /// Unix seconds of the sample that created this event.
    pub trigger_time: i64,
    /// Trigger value rendered as a trimmed fixed-precision decimal.
    pub trigger_value: String,
    /// Sorted, deduplicated `key=value` tags.
    pub tags: Vec<String>,
    /// `tags` joined with `,,`.
    pub tags_joined: String,
    pub is_recovered: bool,
    /// Unix seconds of the pass that last observed this event.
    pub last_eval_time: i64,
}

/// Render a trigger value with fixed 5-decimal precision, then strip
/// trailing zeros and a bare trailing decimal point.
///
/// # Examples
///
/// ```
/// use vigil_common::types::format_trigger_value;
///
/// assert_eq!(format_trigger_value(0.123400), "0.1234");
/// assert_eq!(format_trigger_value(120.0), "120");
/// ```
pub fn format_trigger_value(value: f64) -> String {
    let s = format!("{value:.5}");
    let s = s.trim_end_matches('0');
    s.trim_end_matches('.').to_string()
}

/// Turn a tag map into `"key=value"` strings. More than one tag is sorted
/// lexicographically; a single tag is left as-is (already deterministic).
pub fn tags_to_array(tags: &BTreeMap<String, String>) -> Vec<String> {
    let mut arr: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    if arr.len() > 1 {
        arr.sort();
    }
    arr
}

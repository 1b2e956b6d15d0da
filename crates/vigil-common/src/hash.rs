//! Deterministic hashing for event deduplication and worker identity.

use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::types::AlertRule;

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut s = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Deduplication key of an event: a pure function of the rule id and the
/// sample's series key. Identical inputs across passes yield identical
/// hashes.
pub fn event_hash(rule_id: i64, series_key: &str) -> String {
    sha256_hex(&format!("{rule_id}_{series_key}"))
}

/// Worker identity: a hash over exactly the fields whose change requires a
/// full worker restart (id, evaluation interval, query text). Hot-reloadable
/// fields do not participate.
pub fn rule_fingerprint(rule: &AlertRule) -> String {
    sha256_hex(&format!(
        "{}_{}_{}",
        rule.id, rule.eval_interval_secs, rule.query
    ))
}

//! Snowflake id generation for alert events.
//!
//! Event ids only need to be unique within a cluster; the machine/node pair
//! is derived from the evaluator's node name so two evaluators never mint
//! colliding ids.

use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static BUCKET: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Initialize the generator with explicit machine/node identifiers (each
/// 0-31).
pub fn init(machine_id: i32, node_id: i32) {
    let mut bucket = BUCKET.lock().unwrap_or_else(|p| p.into_inner());
    *bucket = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Initialize the generator from the evaluator's node name.
pub fn init_for_node(name: &str) {
    let h = name.bytes().fold(0u32, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(u32::from(b))
    });
    init((h % 32) as i32, ((h >> 5) % 32) as i32);
}

/// Mint a new id. Falls back to a default bucket when `init` was never
/// called (tests, embedders).
pub fn next_id() -> String {
    let mut bucket = BUCKET.lock().unwrap_or_else(|p| p.into_inner());
    let bucket = bucket.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_numeric() {
        init_for_node("n9e-01.example.org");
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(id.parse::<i64>().is_ok());
            assert!(seen.insert(id));
        }
    }
}

//! Consistent-hash membership view of the evaluator cluster.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::EngineError;

/// Virtual nodes per member. High enough that key ownership stays close to
/// uniform across realistic cluster sizes.
const REPLICAS: usize = 512;

/// Maps rule keys onto cluster members. Immutable after construction; a
/// membership change is a rebuild, and the structure guarantees that only
/// keys owned by departed members (or claimed by joining ones) relocate.
pub struct HashRing {
    ring: BTreeMap<u64, String>,
}

fn point(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

impl HashRing {
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring = BTreeMap::new();
        for member in members {
            let member = member.as_ref();
            for replica in 0..REPLICAS {
                ring.insert(point(&format!("{member}#{replica}")), member.to_string());
            }
        }
        Self { ring }
    }

    /// The member responsible for `key`: the first virtual node at or after
    /// the key's point, wrapping around the ring.
    pub fn get_node(&self, key: &str) -> Result<String, EngineError> {
        if self.ring.is_empty() {
            return Err(EngineError::EmptyRing);
        }
        let p = point(key);
        let node = self
            .ring
            .range(p..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.clone());
        node.ok_or(EngineError::EmptyRing)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

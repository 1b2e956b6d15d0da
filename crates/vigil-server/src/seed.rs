//! Cache seeding from a TOML snapshot file.
//!
//! Stands in for the deployment's definition store: the file is re-read on
//! a fixed period and swapped wholesale into the caches, which is exactly
//! the refresh discipline the evaluation core expects (read-only snapshots,
//! replaced out-of-band).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use vigil_cache::{MuteCache, RuleCache, TargetCache};
use vigil_common::types::{AlertRule, MuteRule, Target};

#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub mutes: Vec<MuteRule>,
}

impl SeedFile {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

pub fn refresh_caches(
    seed: SeedFile,
    rules: &RuleCache,
    targets: &TargetCache,
    mutes: &MuteCache,
) {
    rules.replace_all(seed.rules);
    targets.replace_all(seed.targets);
    mutes.replace_all(seed.mutes);
}

/// Periodic reload; a broken file keeps the previous snapshot in place.
pub async fn reload_loop(
    path: String,
    period: Duration,
    rules: Arc<RuleCache>,
    targets: Arc<TargetCache>,
    mutes: Arc<MuteCache>,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(period);
    tick.tick().await; // the initial load already happened
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => match SeedFile::load(&path) {
                Ok(seed) => refresh_caches(seed, &rules, &targets, &mutes),
                Err(e) => tracing::error!(path = %path, error = %e, "seed reload failed, keeping previous snapshot"),
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vigil_cache::{MuteCache, RuleCache, TargetCache};
use vigil_engine::pool::WorkerPool;
use vigil_engine::queue;
use vigil_engine::ring::HashRing;
use vigil_engine::sharding::ShardPlanner;
use vigil_engine::store::MemoryActiveEventStore;
use vigil_engine::EngineContext;
use vigil_notify::channels::WebhookChannel;
use vigil_notify::consumer::EventConsumer;
use vigil_notify::NotificationChannel;
use vigil_server::config::ServerConfig;
use vigil_server::prom::PromDataSource;
use vigil_server::seed::{self, SeedFile};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    vigil_common::id::init_for_node(&config.engine.node_name);

    let rules = Arc::new(RuleCache::new());
    let targets = Arc::new(TargetCache::new());
    let mutes = Arc::new(MuteCache::new());

    match SeedFile::load(&config.seed_file) {
        Ok(snapshot) => seed::refresh_caches(snapshot, &rules, &targets, &mutes),
        Err(e) => tracing::warn!(
            path = %config.seed_file,
            error = %e,
            "initial seed load failed, starting with empty caches"
        ),
    }

    let ring = Arc::new(HashRing::new(&config.engine.members));
    let (events, receiver) = queue::bounded(config.engine.queue_capacity);
    let data_source = Arc::new(PromDataSource::new(
        &config.datasource.prom_url,
        config.datasource.query_timeout_secs,
    )?);

    let ctx = Arc::new(EngineContext {
        rules: rules.clone(),
        targets: targets.clone(),
        mutes: mutes.clone(),
        data_source,
        events,
        default_eval_interval_secs: config.engine.default_eval_interval_secs,
    });

    let cancel = CancellationToken::new();

    let pool = Arc::new(WorkerPool::new(
        ctx,
        Arc::new(MemoryActiveEventStore::new()),
        cancel.child_token(),
    ));
    let planner = ShardPlanner::new(
        rules.clone(),
        ring,
        pool.clone(),
        &config.engine,
        cancel.child_token(),
    );
    tokio::spawn(planner.run());

    let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();
    for webhook in config.webhooks.clone() {
        channels.push(Box::new(WebhookChannel::new(webhook)?));
    }
    let consumer = EventConsumer::new(channels, cancel.child_token());
    tokio::spawn(consumer.run(receiver));

    tokio::spawn(seed::reload_loop(
        config.seed_file.clone(),
        Duration::from_secs(config.seed_reload_secs.max(1)),
        rules,
        targets,
        mutes,
        cancel.child_token(),
    ));

    tracing::info!(node = %config.engine.node_name, "evaluator started");

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received");
    cancel.cancel();
    pool.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

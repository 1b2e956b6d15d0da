use serde::Deserialize;

use vigil_engine::config::EngineConfig;
use vigil_notify::channels::WebhookConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub datasource: DataSourceConfig,
    /// Notification channels the consumer delivers to.
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
    /// TOML file the rule/target/mute snapshots are refreshed from.
    #[serde(default = "default_seed_file")]
    pub seed_file: String,
    #[serde(default = "default_seed_reload_secs")]
    pub seed_reload_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default = "default_prom_url")]
    pub prom_url: String,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            prom_url: default_prom_url(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

fn default_prom_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_seed_file() -> String {
    "config/seed.toml".to_string()
}

fn default_seed_reload_secs() -> u64 {
    60
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The node must be a ring member, or every rule would land elsewhere.
    fn validate(&self) -> anyhow::Result<()> {
        if self.engine.members.is_empty() {
            anyhow::bail!("engine.members must list at least one node");
        }
        if !self.engine.members.contains(&self.engine.node_name) {
            anyhow::bail!(
                "engine.node_name '{}' is not in engine.members",
                self.engine.node_name
            );
        }
        Ok(())
    }
}

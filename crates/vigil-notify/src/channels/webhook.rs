use std::time::Duration;

use async_trait::async_trait;

use vigil_common::types::AlertEvent;

use crate::error::NotifyError;
use crate::NotificationChannel;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookConfig {
    /// Channel name events are routed by.
    pub name: String,
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub basic_auth_user: Option<String>,
    #[serde(default)]
    pub basic_auth_pass: Option<String>,
    /// Extra headers as `(name, value)` pairs.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Base of the linearly increasing backoff between attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    5_000
}

/// Delivers events as JSON POSTs. Transport errors and HTTP 429 are retried
/// up to three attempts with linearly increasing backoff; any other response
/// is terminal.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Result<Self, NotifyError> {
        if config.url.is_empty() {
            return Err(NotifyError::InvalidConfig("webhook url is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub(crate) fn is_retryable(status: u16) -> bool {
        status == 429
    }

    async fn attempt(&self, body: &str) -> Result<u16, reqwest::Error> {
        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .body(body.to_string());
        if let (Some(user), Some(pass)) =
            (&self.config.basic_auth_user, &self.config.basic_auth_pass)
        {
            req = req.basic_auth(user, Some(pass));
        }
        for (name, value) in &self.config.headers {
            req = req.header(name, value);
        }
        let resp = req.send().await?;
        Ok(resp.status().as_u16())
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, event: &AlertEvent) -> anyhow::Result<()> {
        let body = serde_json::to_string(event).map_err(NotifyError::Json)?;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&body).await {
                Ok(status) if !Self::is_retryable(status) => {
                    tracing::debug!(
                        url = %self.config.url,
                        status,
                        hash = %event.hash,
                        "webhook delivered"
                    );
                    return Ok(());
                }
                Ok(status) => {
                    tracing::warn!(
                        url = %self.config.url,
                        attempt,
                        status,
                        "webhook rate limited, retrying"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        url = %self.config.url,
                        attempt,
                        error = %e,
                        "webhook request failed, retrying"
                    );
                }
            }
            if attempt < MAX_ATTEMPTS {
                let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }

        Err(NotifyError::RetriesExhausted {
            endpoint: self.config.url.clone(),
            attempts: MAX_ATTEMPTS,
        }
        .into())
    }

    fn channel_name(&self) -> &str {
        &self.config.name
    }
}

//! Prometheus-compatible HTTP API data source (instant queries).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use vigil_common::types::Sample;
use vigil_engine::{DataSource, QueryResult};

pub struct PromDataSource {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<VectorItem>,
}

#[derive(Debug, Deserialize)]
struct VectorItem {
    metric: BTreeMap<String, String>,
    /// `[unix_seconds, "value"]` per the Prometheus API.
    value: (f64, String),
}

impl PromDataSource {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn to_query_result(resp: ApiResponse) -> anyhow::Result<QueryResult> {
    if resp.status != "success" {
        anyhow::bail!(
            "query failed: {}",
            resp.error.unwrap_or(resp.status)
        );
    }
    let data = resp
        .data
        .ok_or_else(|| anyhow::anyhow!("query response carries no data"))?;
    if data.result_type != "vector" {
        anyhow::bail!("unexpected result type: {}", data.result_type);
    }

    let mut samples = Vec::with_capacity(data.result.len());
    for item in data.result {
        let (ts, raw) = item.value;
        let value: f64 = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("unparseable sample value {raw:?}: {e}"))?;
        samples.push(Sample {
            labels: item.metric,
            value,
            timestamp: ts as i64,
        });
    }
    Ok(QueryResult {
        samples,
        warnings: resp.warnings,
    })
}

#[async_trait]
impl DataSource for PromDataSource {
    async fn query(&self, query: &str, at: i64) -> anyhow::Result<QueryResult> {
        let url = format!("{}/api/v1/query", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("query", query), ("time", &at.to_string())])
            .send()
            .await?
            .error_for_status()?;
        let resp: ApiResponse = resp.json().await?;
        to_query_result(resp)
    }
}

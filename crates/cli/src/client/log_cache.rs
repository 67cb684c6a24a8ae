//! Log-cache client
//!
//! Speaks the Prometheus-compatible query API and the raw envelope read API.

use super::{ApiClient, TransportConfig};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entitlement_lib::source::{
    Envelope, Labels, MetricsSource, Point, ReadOptions, Sample, Series,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Metrics source backed by log-cache
pub struct LogCacheClient {
    api: ApiClient,
}

impl LogCacheClient {
    pub fn new(base_url: Url, access_token: &str, transport: &TransportConfig) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, access_token, transport)?,
        })
    }
}

#[async_trait]
impl MetricsSource for LogCacheClient {
    async fn instant_query(&self, query: &str) -> Result<Vec<Sample>> {
        let response: PromResponse<VectorSample> = self
            .api
            .get("api/v1/query", &[("query", query.to_string())])
            .await?;

        Ok(response
            .into_result()?
            .into_iter()
            .filter_map(|sample| {
                Some(Sample {
                    point: parse_point(sample.value)?,
                    labels: sample.metric,
                })
            })
            .collect())
    }

    async fn range_query(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Series>> {
        let params = [
            ("query", query.to_string()),
            ("start", from.timestamp().to_string()),
            ("end", to.timestamp().to_string()),
            ("step", format_step(step)),
        ];
        let response: PromResponse<MatrixSeries> =
            self.api.get("api/v1/query_range", &params).await?;

        Ok(response
            .into_result()?
            .into_iter()
            .map(|series| Series {
                labels: series.metric,
                points: series.values.into_iter().filter_map(parse_point).collect(),
            })
            .collect())
    }

    async fn read(
        &self,
        source_id: &str,
        start: DateTime<Utc>,
        options: ReadOptions,
    ) -> Result<Vec<Envelope>> {
        let mut params = vec![("start_time", nanos(start).to_string())];
        if let Some(end) = options.end {
            params.push(("end_time", nanos(end).to_string()));
        }
        if options.descending {
            params.push(("descending", "true".to_string()));
        }
        for envelope_type in &options.envelope_types {
            params.push(("envelope_types", envelope_type.as_str().to_string()));
        }
        if let Some(name_filter) = &options.name_filter {
            params.push(("name_filter", name_filter.clone()));
        }
        if let Some(limit) = options.limit {
            params.push(("limit", limit.to_string()));
        }

        let response: ReadResponse = self
            .api
            .get(&format!("api/v1/read/{}", source_id), &params)
            .await?;

        Ok(response
            .envelopes
            .batch
            .into_iter()
            .map(RawEnvelope::into_envelope)
            .collect())
    }
}

/// Prometheus duration string, in milliseconds when the step is not whole seconds
fn format_step(step: Duration) -> String {
    if step.subsec_millis() == 0 {
        format!("{}s", step.as_secs())
    } else {
        format!("{}ms", step.as_millis())
    }
}

fn nanos(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt().unwrap_or(0)
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct PromResponse<T> {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<PromData<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct PromData<T> {
    #[serde(default)]
    result: Vec<T>,
}

impl<T> PromResponse<T> {
    fn into_result(self) -> Result<Vec<T>> {
        if self.status != "success" {
            anyhow::bail!(
                "Query failed: {}",
                self.error.unwrap_or_else(|| self.status.clone())
            );
        }
        Ok(self.data.map(|data| data.result).unwrap_or_default())
    }
}

/// `[unix_seconds, "value"]`
type PromPoint = (serde_json::Value, String);

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: Labels,
    value: PromPoint,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: Labels,
    #[serde(default)]
    values: Vec<PromPoint>,
}

fn parse_point((time, value): PromPoint) -> Option<Point> {
    let time = match time {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => {
            debug!(time = %other, "Ignoring point with non-numeric time");
            return None;
        }
    };
    let value = match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => {
            debug!(value = %value, "Ignoring point with non-numeric value");
            return None;
        }
    };
    Some(Point { time, value })
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    envelopes: EnvelopeBatch,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeBatch {
    #[serde(default)]
    batch: Vec<RawEnvelope>,
}

/// int64 fields arrive as strings from the JSON gateway
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Int64 {
    Number(i64),
    Text(String),
}

impl Default for Int64 {
    fn default() -> Self {
        Int64::Number(0)
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    instance_id: String,
    #[serde(default)]
    timestamp: Int64,
    #[serde(default)]
    tags: Labels,
    #[serde(default)]
    gauge: Option<Gauge>,
}

#[derive(Debug, Deserialize)]
struct Gauge {
    #[serde(default)]
    metrics: HashMap<String, GaugeValue>,
}

#[derive(Debug, Deserialize)]
struct GaugeValue {
    #[serde(default)]
    value: f64,
}

impl RawEnvelope {
    fn into_envelope(self) -> Envelope {
        let timestamp = match self.timestamp {
            Int64::Number(n) => n.to_string(),
            Int64::Text(text) => text,
        };

        Envelope {
            source_id: self.source_id,
            instance_id: self.instance_id,
            timestamp,
            tags: self.tags,
            metrics: self
                .gauge
                .map(|gauge| {
                    gauge
                        .metrics
                        .into_iter()
                        .map(|(name, metric)| (name, metric.value))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

//! Collaborator seams: the metrics backend and the application catalog
//!
//! Records are returned close to their wire shape (label maps, raw
//! timestamps) so that fetchers can skip individually malformed entries
//! without failing the whole query.

use crate::models::{Application, Space};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

pub type Labels = HashMap<String, String>;

pub const SOURCE_ID_LABEL: &str = "source_id";
pub const INSTANCE_ID_LABEL: &str = "instance_id";
pub const PROCESS_INSTANCE_ID_LABEL: &str = "process_instance_id";

pub const ABSOLUTE_USAGE_METRIC: &str = "absolute_usage";
pub const ABSOLUTE_ENTITLEMENT_METRIC: &str = "absolute_entitlement";

/// A value at a point in time. `time` is unix seconds, possibly fractional.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub time: String,
    pub value: f64,
}

/// One element of an instant query result
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub point: Point,
}

/// One element of a range query result
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: Labels,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeType {
    Log,
    Counter,
    Gauge,
    Timer,
    Event,
}

impl EnvelopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeType::Log => "LOG",
            EnvelopeType::Counter => "COUNTER",
            EnvelopeType::Gauge => "GAUGE",
            EnvelopeType::Timer => "TIMER",
            EnvelopeType::Event => "EVENT",
        }
    }
}

/// A raw envelope as stored by the metrics backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub source_id: String,
    pub instance_id: String,
    /// Nanoseconds since the unix epoch, as sent by the backend
    pub timestamp: String,
    pub tags: Labels,
    pub metrics: HashMap<String, f64>,
}

/// Options for [`MetricsSource::read`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    pub end: Option<DateTime<Utc>>,
    pub descending: bool,
    pub envelope_types: Vec<EnvelopeType>,
    pub name_filter: Option<String>,
    pub limit: Option<usize>,
}

/// Metrics backend answering PromQL-style and raw envelope queries
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluate `query` at the current time
    async fn instant_query(&self, query: &str) -> Result<Vec<Sample>>;

    /// Evaluate `query` over `[from, to]` every `step`
    async fn range_query(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Series>>;

    /// Read raw envelopes emitted by `source_id` since `start`
    async fn read(
        &self,
        source_id: &str,
        start: DateTime<Utc>,
        options: ReadOptions,
    ) -> Result<Vec<Envelope>>;
}

/// Application catalog of the platform the user is targeting
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All spaces of the current organization, each with its applications
    async fn get_spaces(&self) -> Result<Vec<Space>>;

    async fn get_current_org(&self) -> Result<String>;

    async fn get_current_space(&self) -> Result<String>;

    /// Look up an application of the current space by name.
    ///
    /// The returned application carries no instances.
    async fn get_application(&self, name: &str) -> Result<Application>;

    async fn username(&self) -> Result<String>;
}

/// Entitlement usage ratio of every instance of `app_guid`
pub fn ratio_query(app_guid: &str) -> String {
    format!(
        r#"{usage}{{{label}="{guid}"}} / {entitlement}{{{label}="{guid}"}}"#,
        usage = ABSOLUTE_USAGE_METRIC,
        entitlement = ABSOLUTE_ENTITLEMENT_METRIC,
        label = SOURCE_ID_LABEL,
        guid = app_guid,
    )
}

/// Entitlement usage ratio over the last reporting interval
pub fn rate_query(app_guid: &str) -> String {
    format!(
        r#"idelta({usage}{{{label}="{guid}"}}[1m]) / idelta({entitlement}{{{label}="{guid}"}}[1m])"#,
        usage = ABSOLUTE_USAGE_METRIC,
        entitlement = ABSOLUTE_ENTITLEMENT_METRIC,
        label = SOURCE_ID_LABEL,
        guid = app_guid,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_query() {
        assert_eq!(
            ratio_query("abc"),
            r#"absolute_usage{source_id="abc"} / absolute_entitlement{source_id="abc"}"#
        );
    }

    #[test]
    fn test_rate_query() {
        assert_eq!(
            rate_query("abc"),
            r#"idelta(absolute_usage{source_id="abc"}[1m]) / idelta(absolute_entitlement{source_id="abc"}[1m])"#
        );
    }
}

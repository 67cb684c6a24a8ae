//! Entitlement usage retrieval from the metrics backend
//!
//! This module provides:
//! - Process instance resolution from raw envelopes
//! - Cumulative usage (instantaneous ratio)
//! - Current usage (interval rate, falling back to cumulative)
//! - Historical usage (ratio series over a window)
//!
//! Backend errors abort a fetch unchanged. Malformed records are skipped.

mod cumulative;
mod current;
mod historical;
mod process_instance;


pub use cumulative::CumulativeUsageFetcher;
pub use current::CurrentUsageFetcher;
pub use historical::{HistoricalUsageFetcher, DEFAULT_QUERY_STEP};
pub use process_instance::{ProcessInstanceResolver, DEFAULT_MAX_PAGES, DEFAULT_READ_LIMIT};

use crate::models::{Instance, InstanceId, InstanceUsage};
use crate::source::{Labels, INSTANCE_ID_LABEL, PROCESS_INSTANCE_ID_LABEL};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Trait for usage retrieval strategies
#[async_trait]
pub trait UsageFetcher: Send + Sync {
    /// Fetch usage samples of `app_guid`, keyed by instance id
    async fn fetch(
        &self,
        app_guid: &str,
        instances: &BTreeMap<InstanceId, Instance>,
    ) -> Result<InstanceUsage>;
}

/// Parse an instance id from its textual form
pub(crate) fn parse_instance_id(raw: &str) -> Option<InstanceId> {
    raw.parse().ok()
}

/// Parse the `instance_id` label, logging when it is corrupt
pub(crate) fn instance_id_label(labels: &Labels) -> Option<InstanceId> {
    let raw = labels.get(INSTANCE_ID_LABEL).map(String::as_str).unwrap_or("");
    let parsed = parse_instance_id(raw);
    if parsed.is_none() {
        tracing::debug!(instance_id = %raw, "Ignoring corrupt instance id");
    }
    parsed
}

/// The `process_instance_id` label, if present and non-empty
pub(crate) fn process_instance_id_label(labels: &Labels) -> Option<&str> {
    labels
        .get(PROCESS_INSTANCE_ID_LABEL)
        .map(String::as_str)
        .filter(|id| !id.is_empty())
}

/// Parse a unix timestamp in (possibly fractional) seconds
pub(crate) fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() {
        return None;
    }

    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Parse a nanosecond envelope timestamp
pub(crate) fn parse_nanos(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim().parse().ok().map(DateTime::from_timestamp_nanos)
}

//! Historical usage: the entitlement ratio series over a time window

use super::{instance_id_label, parse_time, process_instance_id_label, UsageFetcher};
use crate::models::{Instance, InstanceData, InstanceId, InstanceUsage};
use crate::source::{ratio_query, MetricsSource, Series};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Resolution of the historical series
pub const DEFAULT_QUERY_STEP: Duration = Duration::from_secs(15);

/// Fetches ratio series over `[from, to]` for active process instances only.
///
/// A process instance is active when it appears in an instantaneous ratio
/// query issued just before the range query. Series of scaled-down or
/// replaced instances are dropped.
pub struct HistoricalUsageFetcher {
    source: Arc<dyn MetricsSource>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl HistoricalUsageFetcher {
    pub fn new(source: Arc<dyn MetricsSource>, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { source, from, to }
    }

    async fn active_process_instances(&self, query: &str) -> Result<HashSet<String>> {
        let samples = self.source.instant_query(query).await?;
        Ok(samples
            .iter()
            .filter_map(|sample| process_instance_id_label(&sample.labels))
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl UsageFetcher for HistoricalUsageFetcher {
    async fn fetch(
        &self,
        app_guid: &str,
        _instances: &BTreeMap<InstanceId, Instance>,
    ) -> Result<InstanceUsage> {
        let query = ratio_query(app_guid);
        let active = self.active_process_instances(&query).await?;

        let series = self
            .source
            .range_query(&query, self.from, self.to, DEFAULT_QUERY_STEP)
            .await?;

        let usage = group_by_instance(series, &active);
        debug!(
            app_guid = %app_guid,
            active = active.len(),
            instances = usage.len(),
            "Fetched historical usage"
        );
        Ok(usage)
    }
}

fn group_by_instance(series: Vec<Series>, active: &HashSet<String>) -> InstanceUsage {
    let mut usage = InstanceUsage::new();

    for s in series {
        match process_instance_id_label(&s.labels) {
            Some(id) if active.contains(id) => {}
            _ => {
                debug!(labels = ?s.labels, "Ignoring series of inactive process instance");
                continue;
            }
        }
        let Some(instance_id) = instance_id_label(&s.labels) else {
            continue;
        };

        let points = s.points.iter().filter_map(|point| {
            let time = parse_time(&point.time)?;
            Some(InstanceData {
                instance_id,
                time,
                value: point.value,
            })
        });
        usage.entry(instance_id).or_default().extend(points);
    }

    usage.retain(|_, data| !data.is_empty());
    for data in usage.values_mut() {
        data.sort_by_key(|d| d.time);
    }

    usage
}

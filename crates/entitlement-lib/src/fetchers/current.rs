//! Current usage: entitlement ratio over the last reporting interval
//!
//! The backend needs two points a reporting interval apart to compute the
//! rate, so freshly started instances are missing from the result. Those are
//! filled from the fallback fetcher.

use super::{
    instance_id_label, parse_time, process_instance_id_label, CumulativeUsageFetcher,
    UsageFetcher,
};
use crate::models::{Instance, InstanceData, InstanceId, InstanceUsage};
use crate::source::{rate_query, MetricsSource, Sample};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CurrentUsageFetcher<F = CumulativeUsageFetcher> {
    source: Arc<dyn MetricsSource>,
    fallback: F,
}

impl CurrentUsageFetcher<CumulativeUsageFetcher> {
    /// Create a fetcher falling back to cumulative usage on the same source
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        let fallback = CumulativeUsageFetcher::new(Arc::clone(&source));
        Self { source, fallback }
    }
}

impl<F: UsageFetcher> CurrentUsageFetcher<F> {
    pub fn with_fallback(source: Arc<dyn MetricsSource>, fallback: F) -> Self {
        Self { source, fallback }
    }
}

#[async_trait]
impl<F: UsageFetcher> UsageFetcher for CurrentUsageFetcher<F> {
    async fn fetch(
        &self,
        app_guid: &str,
        instances: &BTreeMap<InstanceId, Instance>,
    ) -> Result<InstanceUsage> {
        let query = rate_query(app_guid);
        let samples = self.source.instant_query(&query).await.map_err(|e| {
            warn!(app_guid = %app_guid, query = %query, error = %e, "Current usage query failed");
            e
        })?;

        let mut usage = parse_current_usage(samples, instances);
        if usage.len() >= instances.len() {
            return Ok(usage);
        }

        debug!(
            app_guid = %app_guid,
            expected = instances.len(),
            found = usage.len(),
            "Falling back to cumulative usage"
        );

        let mut fallback_usage = self.fallback.fetch(app_guid, instances).await?;
        for instance_id in instances.keys() {
            if usage.contains_key(instance_id) {
                continue;
            }
            if let Some(samples) = fallback_usage.remove(instance_id) {
                usage.insert(*instance_id, samples);
            }
        }

        Ok(usage)
    }
}

/// Keep samples of known instances whose process instance is still current
fn parse_current_usage(
    samples: Vec<Sample>,
    instances: &BTreeMap<InstanceId, Instance>,
) -> InstanceUsage {
    let mut usage = InstanceUsage::new();

    for sample in samples {
        let Some(instance_id) = instance_id_label(&sample.labels) else {
            continue;
        };
        let Some(instance) = instances.get(&instance_id) else {
            debug!(instance_id, "Ignoring usage of instance that is no longer running");
            continue;
        };
        if process_instance_id_label(&sample.labels) != Some(instance.process_instance_id.as_str())
        {
            debug!(instance_id, "Ignoring usage of stale process instance");
            continue;
        }
        let Some(time) = parse_time(&sample.point.time) else {
            debug!(instance_id, time = %sample.point.time, "Ignoring sample with corrupt timestamp");
            continue;
        };

        usage.entry(instance_id).or_insert_with(|| {
            vec![InstanceData {
                instance_id,
                time,
                value: sample.point.value,
            }]
        });
    }

    usage
}

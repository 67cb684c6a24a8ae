//! Cumulative usage: the instantaneous entitlement ratio per instance

use super::{instance_id_label, parse_time, UsageFetcher};
use crate::models::{Instance, InstanceData, InstanceId, InstanceUsage};
use crate::source::{ratio_query, MetricsSource};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches at most one ratio sample per instance.
///
/// Samples are not matched against process instance ids, so the fetcher can
/// classify applications whose instances have not been resolved.
pub struct CumulativeUsageFetcher {
    source: Arc<dyn MetricsSource>,
}

impl CumulativeUsageFetcher {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl UsageFetcher for CumulativeUsageFetcher {
    async fn fetch(
        &self,
        app_guid: &str,
        _instances: &BTreeMap<InstanceId, Instance>,
    ) -> Result<InstanceUsage> {
        let query = ratio_query(app_guid);
        let samples = self.source.instant_query(&query).await.map_err(|e| {
            warn!(app_guid = %app_guid, query = %query, error = %e, "Cumulative usage query failed");
            e
        })?;

        let mut usage = InstanceUsage::new();
        for sample in samples {
            let Some(instance_id) = instance_id_label(&sample.labels) else {
                continue;
            };
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

        debug!(app_guid = %app_guid, instances = usage.len(), "Fetched cumulative usage");
        Ok(usage)
    }
}

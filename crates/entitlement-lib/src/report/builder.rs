//! Per-instance report assembly

use super::SpikeDetector;
use crate::fetchers::UsageFetcher;
use crate::models::{Application, InstanceId, InstanceReport};
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::debug;

/// Merges historical and current usage of an application into one report
/// per instance
pub struct Reporter<H, C> {
    historical: H,
    current: C,
    detector: SpikeDetector,
}

impl<H: UsageFetcher, C: UsageFetcher> Reporter<H, C> {
    pub fn new(historical: H, current: C) -> Self {
        Self {
            historical,
            current,
            detector: SpikeDetector::default(),
        }
    }

    /// Build reports for every instance seen by either fetcher, ordered by
    /// instance id
    pub async fn create_instance_reports(&self, app: &Application) -> Result<Vec<InstanceReport>> {
        let mut reports: BTreeMap<InstanceId, InstanceReport> = BTreeMap::new();

        let historical = self.historical.fetch(&app.guid, &app.instances).await?;
        for (instance_id, data) in &historical {
            let Some(last) = data.last() else {
                continue;
            };
            let report = reports
                .entry(*instance_id)
                .or_insert_with(|| InstanceReport::new(*instance_id));
            report.historical_usage.value = last.value;
            report.historical_usage.last_spike = self.detector.detect(data);
        }

        let current = self.current.fetch(&app.guid, &app.instances).await?;
        for (instance_id, data) in &current {
            let [sample] = data.as_slice() else {
                debug!(instance_id, samples = data.len(), "Ignoring ambiguous current usage");
                continue;
            };
            reports
                .entry(*instance_id)
                .or_insert_with(|| InstanceReport::new(*instance_id))
                .current_usage
                .value = sample.value;
        }

        debug!(app_guid = %app.guid, instances = reports.len(), "Built instance reports");
        Ok(reports.into_values().collect())
    }
}

//! Process instance resolution
//!
//! Scans raw entitlement envelopes newest-first and records, per instance
//! id, the process instance id of the most recent envelope.

use super::{parse_instance_id, parse_nanos};
use crate::models::InstanceId;
use crate::source::{
    EnvelopeType, MetricsSource, ReadOptions, ABSOLUTE_ENTITLEMENT_METRIC,
    PROCESS_INSTANCE_ID_LABEL,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Default number of envelopes requested per page
pub const DEFAULT_READ_LIMIT: usize = 1000;

/// Upper bound on pages read for one resolution
pub const DEFAULT_MAX_PAGES: usize = 10;

pub struct ProcessInstanceResolver {
    source: Arc<dyn MetricsSource>,
    limit: usize,
    max_pages: usize,
}

impl ProcessInstanceResolver {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self {
            source,
            limit: DEFAULT_READ_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Set the page size
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Set the maximum number of pages read
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Resolve `instance_id -> process_instance_id` for `app_guid`
    pub async fn fetch(&self, app_guid: &str) -> Result<BTreeMap<InstanceId, String>> {
        let mut process_instance_ids = BTreeMap::new();
        let mut end: Option<DateTime<Utc>> = None;

        for page in 0..self.max_pages {
            let envelopes = self
                .source
                .read(
                    app_guid,
                    DateTime::<Utc>::default(),
                    ReadOptions {
                        end,
                        descending: true,
                        envelope_types: vec![EnvelopeType::Gauge],
                        name_filter: Some(ABSOLUTE_ENTITLEMENT_METRIC.to_string()),
                        limit: Some(self.limit),
                    },
                )
                .await?;

            let mut oldest = None;
            for envelope in &envelopes {
                let Some(timestamp) = parse_nanos(&envelope.timestamp) else {
                    debug!(timestamp = %envelope.timestamp, "Ignoring envelope with corrupt timestamp");
                    continue;
                };
                oldest = Some(timestamp);

                let Some(instance_id) = parse_instance_id(&envelope.instance_id) else {
                    debug!(instance_id = %envelope.instance_id, "Ignoring corrupt instance id");
                    continue;
                };

                let process_instance_id = match envelope.tags.get(PROCESS_INSTANCE_ID_LABEL) {
                    Some(id) if !id.is_empty() => id,
                    _ => continue,
                };

                process_instance_ids
                    .entry(instance_id)
                    .or_insert_with(|| process_instance_id.clone());
            }

            debug!(
                app_guid = %app_guid,
                page,
                envelopes = envelopes.len(),
                resolved = process_instance_ids.len(),
                "Read process instance page"
            );

            if envelopes.len() < self.limit {
                break;
            }

            // A full page with no readable timestamp gives no place to resume from
            match oldest {
                Some(oldest) => end = Some(oldest),
                None => break,
            }
        }

        Ok(process_instance_ids)
    }
}

//! Core data models for entitlement usage reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric instance slot of an application. Reused across restarts.
pub type InstanceId = u32;

/// Usage samples per instance, as returned by every fetcher
pub type InstanceUsage = BTreeMap<InstanceId, Vec<InstanceData>>;

/// A running application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: InstanceId,
    /// Changes whenever the platform replaces the process behind `instance_id`
    pub process_instance_id: String,
}

/// Application as known to the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub guid: String,
    pub instances: BTreeMap<InstanceId, Instance>,
}

impl Application {
    /// Create an application with no known instances
    pub fn new(name: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: guid.into(),
            instances: BTreeMap::new(),
        }
    }

    /// Replace the instance map from `instance_id -> process_instance_id` pairs
    pub fn with_instances<I, S>(mut self, process_instance_ids: I) -> Self
    where
        I: IntoIterator<Item = (InstanceId, S)>,
        S: Into<String>,
    {
        self.instances = process_instance_ids
            .into_iter()
            .map(|(instance_id, process_instance_id)| {
                (
                    instance_id,
                    Instance {
                        instance_id,
                        process_instance_id: process_instance_id.into(),
                    },
                )
            })
            .collect();
        self
    }
}

/// A space and the applications deployed in it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub name: String,
    pub applications: Vec<Application>,
}

/// One entitlement usage sample.
///
/// `value` is `absolute_usage / absolute_entitlement`: 1.0 is exactly at
/// entitlement, anything above is over entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceData {
    pub instance_id: InstanceId,
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Most recent contiguous window of over-entitlement samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spike {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Spike {
    /// True when the spike consists of a single sample
    pub fn is_instant(&self) -> bool {
        self.from == self.to
    }
}

/// Usage over the historical window.
///
/// `value` is the latest sample in the window, not a mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalUsage {
    pub value: f64,
    pub last_spike: Option<Spike>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentUsage {
    pub value: f64,
}

/// Reconciled usage for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceReport {
    pub instance_id: InstanceId,
    pub historical_usage: HistoricalUsage,
    pub current_usage: CurrentUsage,
}

impl InstanceReport {
    /// Create a report with zero-valued usage on both sides
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            historical_usage: HistoricalUsage::default(),
            current_usage: CurrentUsage::default(),
        }
    }

    pub fn has_recorded_spike(&self) -> bool {
        self.last_spike_to().is_some()
    }

    pub fn last_spike_from(&self) -> Option<DateTime<Utc>> {
        self.historical_usage.last_spike.map(|spike| spike.from)
    }

    pub fn last_spike_to(&self) -> Option<DateTime<Utc>> {
        self.historical_usage.last_spike.map(|spike| spike.to)
    }
}

/// Instance reports plus the context they were produced in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationReport {
    pub org: String,
    pub space: String,
    pub username: String,
    pub application_name: String,
    pub instance_reports: Vec<InstanceReport>,
}

/// Over-entitlement applications of one space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceReport {
    pub space_name: String,
    pub apps: Vec<String>,
}

/// Organization-wide over-entitlement report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OeiReport {
    pub org: String,
    pub username: String,
    pub space_reports: Vec<SpaceReport>,
}

impl OeiReport {
    pub fn is_empty(&self) -> bool {
        self.space_reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_with_instances_builds_instance_map() {
        let app = Application::new("web", "app-guid").with_instances([(0, "p-0"), (2, "p-2")]);

        assert_eq!(app.instances.len(), 2);
        assert_eq!(app.instances[&2].instance_id, 2);
        assert_eq!(app.instances[&2].process_instance_id, "p-2");
    }

    #[test]
    fn test_spike_accessors_follow_last_spike() {
        let mut report = InstanceReport::new(3);
        assert!(!report.has_recorded_spike());
        assert_eq!(report.last_spike_from(), None);

        let from = Utc.timestamp_opt(100, 0).unwrap();
        let to = Utc.timestamp_opt(160, 0).unwrap();
        report.historical_usage.last_spike = Some(Spike { from, to });

        assert!(report.has_recorded_spike());
        assert_eq!(report.last_spike_from(), Some(from));
        assert_eq!(report.last_spike_to(), Some(to));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = OeiReport {
            org: "org".to_string(),
            username: "admin".to_string(),
            space_reports: vec![SpaceReport {
                space_name: "dev".to_string(),
                apps: vec!["web".to_string()],
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["space_reports"][0]["apps"][0], "web");
    }
}

//! In-memory collaborators for unit tests

use crate::fetchers::UsageFetcher;
use crate::models::{Application, Instance, InstanceData, InstanceId, InstanceUsage, Space};
use crate::source::{
    Catalog, Envelope, Labels, MetricsSource, Point, ReadOptions, Sample, Series,
    INSTANCE_ID_LABEL, PROCESS_INSTANCE_ID_LABEL,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn labels(instance_id: &str, process_instance_id: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(INSTANCE_ID_LABEL.to_string(), instance_id.to_string());
    labels.insert(
        PROCESS_INSTANCE_ID_LABEL.to_string(),
        process_instance_id.to_string(),
    );
    labels
}

pub fn sample(instance_id: &str, process_instance_id: &str, time: i64, value: f64) -> Sample {
    Sample {
        labels: labels(instance_id, process_instance_id),
        point: Point {
            time: time.to_string(),
            value,
        },
    }
}

pub fn series(instance_id: &str, process_instance_id: &str, points: &[(i64, f64)]) -> Series {
    Series {
        labels: labels(instance_id, process_instance_id),
        points: points
            .iter()
            .map(|(time, value)| Point {
                time: time.to_string(),
                value: *value,
            })
            .collect(),
    }
}

pub fn envelope(instance_id: &str, process_instance_id: Option<&str>, timestamp: i64) -> Envelope {
    let mut tags = Labels::new();
    if let Some(id) = process_instance_id {
        tags.insert(PROCESS_INSTANCE_ID_LABEL.to_string(), id.to_string());
    }
    Envelope {
        source_id: "app-guid".to_string(),
        instance_id: instance_id.to_string(),
        timestamp: timestamp.to_string(),
        tags,
        metrics: HashMap::from([("absolute_entitlement".to_string(), 100.0)]),
    }
}

pub fn data(instance_id: InstanceId, time: i64, value: f64) -> InstanceData {
    InstanceData {
        instance_id,
        time: ts(time),
        value,
    }
}

pub fn instances(pairs: &[(InstanceId, &str)]) -> BTreeMap<InstanceId, Instance> {
    Application::new("app", "app-guid")
        .with_instances(pairs.iter().map(|(id, pid)| (*id, *pid)))
        .instances
}

type Scripted<T> = Result<T, String>;

/// Metrics source answering from canned responses keyed by query
#[derive(Default)]
pub struct FakeSource {
    instant: Mutex<HashMap<String, Scripted<Vec<Sample>>>>,
    range: Mutex<HashMap<String, Scripted<Vec<Series>>>>,
    read_pages: Mutex<VecDeque<Scripted<Vec<Envelope>>>>,
    read_default: Mutex<Option<Scripted<Vec<Envelope>>>>,
    pub instant_calls: Mutex<Vec<String>>,
    pub range_calls: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>, Duration)>>,
    pub read_calls: Mutex<Vec<(String, ReadOptions)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instant(self, query: String, samples: Vec<Sample>) -> Self {
        self.instant.lock().unwrap().insert(query, Ok(samples));
        self
    }

    pub fn with_instant_error(self, query: String, message: &str) -> Self {
        self.instant
            .lock()
            .unwrap()
            .insert(query, Err(message.to_string()));
        self
    }

    pub fn with_range(self, query: String, series: Vec<Series>) -> Self {
        self.range.lock().unwrap().insert(query, Ok(series));
        self
    }

    pub fn with_range_error(self, query: String, message: &str) -> Self {
        self.range
            .lock()
            .unwrap()
            .insert(query, Err(message.to_string()));
        self
    }

    /// Queue a page returned by the next `read` call
    pub fn with_read_page(self, envelopes: Vec<Envelope>) -> Self {
        self.read_pages.lock().unwrap().push_back(Ok(envelopes));
        self
    }

    /// Page returned once the queued pages are exhausted
    pub fn with_read_default(self, envelopes: Vec<Envelope>) -> Self {
        *self.read_default.lock().unwrap() = Some(Ok(envelopes));
        self
    }

    pub fn with_read_error(self, message: &str) -> Self {
        *self.read_default.lock().unwrap() = Some(Err(message.to_string()));
        self
    }

    pub fn instant_call_count(&self) -> usize {
        self.instant_calls.lock().unwrap().len()
    }

    pub fn read_call_count(&self) -> usize {
        self.read_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MetricsSource for FakeSource {
    async fn instant_query(&self, query: &str) -> Result<Vec<Sample>> {
        self.instant_calls.lock().unwrap().push(query.to_string());
        match self.instant.lock().unwrap().get(query) {
            Some(Ok(samples)) => Ok(samples.clone()),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn range_query(
        &self,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<Series>> {
        self.range_calls
            .lock()
            .unwrap()
            .push((query.to_string(), from, to, step));
        match self.range.lock().unwrap().get(query) {
            Some(Ok(series)) => Ok(series.clone()),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn read(
        &self,
        source_id: &str,
        _start: DateTime<Utc>,
        options: ReadOptions,
    ) -> Result<Vec<Envelope>> {
        self.read_calls
            .lock()
            .unwrap()
            .push((source_id.to_string(), options));

        let queued = self.read_pages.lock().unwrap().pop_front();
        let page = match queued {
            Some(page) => page,
            None => self
                .read_default
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(Vec::new())),
        };
        page.map_err(|message| anyhow!(message))
    }
}

/// Usage fetcher returning canned usage, recording the guids it was asked for
#[derive(Default)]
pub struct FakeFetcher {
    usage: HashMap<String, Scripted<InstanceUsage>>,
    pub calls: Mutex<Vec<(String, BTreeMap<InstanceId, Instance>)>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_usage(mut self, app_guid: &str, usage: InstanceUsage) -> Self {
        self.usage.insert(app_guid.to_string(), Ok(usage));
        self
    }

    /// Usage made of one sample per listed `(instance_id, value)`
    pub fn with_ratios(self, app_guid: &str, ratios: &[(InstanceId, f64)]) -> Self {
        let usage = ratios
            .iter()
            .map(|(id, value)| (*id, vec![data(*id, 100, *value)]))
            .collect();
        self.with_usage(app_guid, usage)
    }

    pub fn with_error(mut self, app_guid: &str, message: &str) -> Self {
        self.usage
            .insert(app_guid.to_string(), Err(message.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl UsageFetcher for FakeFetcher {
    async fn fetch(
        &self,
        app_guid: &str,
        instances: &BTreeMap<InstanceId, Instance>,
    ) -> Result<InstanceUsage> {
        self.calls
            .lock()
            .unwrap()
            .push((app_guid.to_string(), instances.clone()));
        match self.usage.get(app_guid) {
            Some(Ok(usage)) => Ok(usage.clone()),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(InstanceUsage::new()),
        }
    }
}

/// Catalog backed by fixed spaces
pub struct FakeCatalog {
    pub org: String,
    pub space: String,
    pub username: String,
    pub spaces: Vec<Space>,
    pub spaces_error: Option<String>,
}

impl Default for FakeCatalog {
    fn default() -> Self {
        Self {
            org: "the-org".to_string(),
            space: "the-space".to_string(),
            username: "the-user".to_string(),
            spaces: Vec::new(),
            spaces_error: None,
        }
    }
}

impl FakeCatalog {
    pub fn with_space(mut self, name: &str, apps: &[(&str, &str)]) -> Self {
        self.spaces.push(Space {
            name: name.to_string(),
            applications: apps
                .iter()
                .map(|(name, guid)| Application::new(*name, *guid))
                .collect(),
        });
        self
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn get_spaces(&self) -> Result<Vec<Space>> {
        match &self.spaces_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(self.spaces.clone()),
        }
    }

    async fn get_current_org(&self) -> Result<String> {
        Ok(self.org.clone())
    }

    async fn get_current_space(&self) -> Result<String> {
        Ok(self.space.clone())
    }

    async fn get_application(&self, name: &str) -> Result<Application> {
        self.spaces
            .iter()
            .find(|space| space.name == self.space)
            .and_then(|space| space.applications.iter().find(|app| app.name == name))
            .cloned()
            .ok_or_else(|| {
                crate::EntitlementError::AppNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    async fn username(&self) -> Result<String> {
        Ok(self.username.clone())
    }
}

//! Organization-wide over-entitlement classification

use super::ENTITLEMENT_THRESHOLD;
use crate::fetchers::{CumulativeUsageFetcher, UsageFetcher};
use crate::models::{Application, OeiReport, SpaceReport};
use crate::source::Catalog;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Lists applications of the current organization with at least one
/// instance over entitlement
pub struct OverEntitlementReporter<F = CumulativeUsageFetcher> {
    catalog: Arc<dyn Catalog>,
    fetcher: F,
}

impl<F: UsageFetcher> OverEntitlementReporter<F> {
    pub fn new(catalog: Arc<dyn Catalog>, fetcher: F) -> Self {
        Self { catalog, fetcher }
    }

    pub async fn over_entitlement_instances(&self) -> Result<OeiReport> {
        let org = self.catalog.get_current_org().await?;
        let username = self.catalog.username().await?;
        let spaces = self.catalog.get_spaces().await?;

        let mut over: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for space in &spaces {
            for app in &space.applications {
                if self.is_over_entitlement(app).await? {
                    debug!(space = %space.name, app = %app.name, "Application is over entitlement");
                    over.entry(space.name.clone())
                        .or_default()
                        .push(app.name.clone());
                }
            }
        }

        let space_reports: Vec<SpaceReport> = over
            .into_iter()
            .map(|(space_name, mut apps)| {
                apps.sort();
                SpaceReport { space_name, apps }
            })
            .collect();

        info!(
            org = %org,
            spaces = spaces.len(),
            over_entitlement_spaces = space_reports.len(),
            "Classified organization applications"
        );

        Ok(OeiReport {
            org,
            username,
            space_reports,
        })
    }

    async fn is_over_entitlement(&self, app: &Application) -> Result<bool> {
        let usage = self.fetcher.fetch(&app.guid, &app.instances).await?;
        Ok(usage
            .values()
            .flatten()
            .any(|data| data.value > ENTITLEMENT_THRESHOLD))
    }
}

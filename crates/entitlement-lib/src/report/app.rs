//! Application usage report

use super::Reporter;
use crate::error::EntitlementError;
use crate::fetchers::{
    CurrentUsageFetcher, HistoricalUsageFetcher, ProcessInstanceResolver, UsageFetcher,
};
use crate::models::ApplicationReport;
use crate::source::Catalog;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Produces the usage report of one application of the current space
pub struct AppReporter<H = HistoricalUsageFetcher, C = CurrentUsageFetcher> {
    catalog: Arc<dyn Catalog>,
    resolver: ProcessInstanceResolver,
    reporter: Reporter<H, C>,
}

impl<H: UsageFetcher, C: UsageFetcher> AppReporter<H, C> {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        resolver: ProcessInstanceResolver,
        reporter: Reporter<H, C>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            reporter,
        }
    }

    /// Build the report of application `app_name`.
    ///
    /// An application without running instances yields a report with no
    /// instance reports. An application whose instances produced no usage
    /// at all fails with [`EntitlementError::UnsupportedDeployment`].
    pub async fn create_application_report(&self, app_name: &str) -> Result<ApplicationReport> {
        let org = self.catalog.get_current_org().await?;
        let space = self.catalog.get_current_space().await?;
        let username = self.catalog.username().await?;

        let app = self.catalog.get_application(app_name).await?;
        let process_instance_ids = self.resolver.fetch(&app.guid).await?;
        let app = app.with_instances(process_instance_ids);

        let mut report = ApplicationReport {
            org,
            space,
            username,
            application_name: app.name.clone(),
            instance_reports: Vec::new(),
        };

        if app.instances.is_empty() {
            debug!(app = %app.name, app_guid = %app.guid, "Application has no running instances");
            return Ok(report);
        }

        report.instance_reports = self.reporter.create_instance_reports(&app).await?;
        if report.instance_reports.is_empty() {
            return Err(EntitlementError::UnsupportedDeployment {
                app: app.name.clone(),
            }
            .into());
        }

        info!(
            app = %app.name,
            instances = report.instance_reports.len(),
            "Created application report"
        );
        Ok(report)
    }
}

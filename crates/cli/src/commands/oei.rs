//! Over-entitlement instances command

use anyhow::Result;
use colored::Colorize;
use entitlement_lib::{CumulativeUsageFetcher, OeiReport, OverEntitlementReporter};
use tabled::Tabled;

use super::Clients;
use crate::config::Settings;
use crate::output::{print_info, print_json, print_table, OutputFormat};

/// Row for the over-entitlement table
#[derive(Debug, PartialEq, Tabled)]
struct OverEntitlementRow {
    space: String,
    app: String,
}

/// Show the applications of the targeted org with instances over entitlement
pub async fn show_over_entitlement_instances(
    settings: &Settings,
    format: OutputFormat,
) -> Result<()> {
    let clients = Clients::from_settings(settings)?;
    let fetcher = CumulativeUsageFetcher::new(clients.metrics);

    let report = OverEntitlementReporter::new(clients.catalog, fetcher)
        .over_entitlement_instances()
        .await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_info("Note: This feature is experimental.");
            if report.is_empty() {
                println!("No apps over entitlement in org {}.", report.org.cyan().bold());
                return Ok(());
            }

            println!(
                "Showing over-entitlement apps in org {} as {}...",
                report.org.cyan().bold(),
                report.username.cyan().bold()
            );
            println!();
            print_table(&rows(&report));
        }
    }

    Ok(())
}

fn rows(report: &OeiReport) -> Vec<OverEntitlementRow> {
    report
        .space_reports
        .iter()
        .flat_map(|space| {
            space.apps.iter().map(|app| OverEntitlementRow {
                space: space.space_name.clone(),
                app: app.clone(),
            })
        })
        .collect()
}

//! Application usage command

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use entitlement_lib::{
    AppReporter, ApplicationReport, CurrentUsageFetcher, HistoricalUsageFetcher, InstanceReport,
    ProcessInstanceResolver, Reporter,
};
use std::sync::Arc;
use tabled::Tabled;

use super::Clients;
use crate::config::Settings;
use crate::output::{
    format_usage, print_info, print_json, print_table, print_tip, print_warning, OutputFormat,
};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ratio above which an instance is reported as near its entitlement
const NEAR_ENTITLEMENT: f64 = 0.95;

/// Row for the instance usage table
#[derive(Debug, PartialEq, Tabled)]
struct InstanceRow {
    #[tabled(rename = "")]
    instance: String,
    #[tabled(rename = "avg usage")]
    avg_usage: String,
    #[tabled(rename = "curr usage")]
    curr_usage: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum UsageLevel {
    Normal,
    Near,
    Over,
}

impl UsageLevel {
    fn of(ratio: f64) -> Self {
        if ratio > 1.0 {
            UsageLevel::Over
        } else if ratio > NEAR_ENTITLEMENT {
            UsageLevel::Near
        } else {
            UsageLevel::Normal
        }
    }

    fn paint(self, text: String) -> String {
        match self {
            UsageLevel::Over => text.red().to_string(),
            UsageLevel::Near => text.yellow().to_string(),
            UsageLevel::Normal => text,
        }
    }
}

/// Show CPU usage against entitlement for every instance of `app_name`
pub async fn show_app_usage(settings: &Settings, app_name: &str, format: OutputFormat) -> Result<()> {
    settings.space()?;
    let to = Utc::now();
    let from = settings.history_start(to)?;
    let clients = Clients::from_settings(settings)?;

    let resolver = ProcessInstanceResolver::new(Arc::clone(&clients.metrics))
        .with_limit(settings.read_limit)
        .with_max_pages(settings.read_max_pages);
    let reporter = Reporter::new(
        HistoricalUsageFetcher::new(Arc::clone(&clients.metrics), from, to),
        CurrentUsageFetcher::new(Arc::clone(&clients.metrics)),
    );

    let report = AppReporter::new(clients.catalog, resolver, reporter)
        .create_application_report(app_name)
        .await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => render(&report),
    }

    Ok(())
}

fn render(report: &ApplicationReport) {
    print_info("Note: This feature is experimental.");
    println!("{}", header(report));
    println!();

    if report.instance_reports.is_empty() {
        print_info(&format!(
            "There are no running instances of app {}.",
            report.application_name
        ));
        return;
    }

    let rows: Vec<InstanceRow> = report
        .instance_reports
        .iter()
        .map(|instance| {
            let level = UsageLevel::of(instance.historical_usage.value);
            let row = instance_row(instance);
            InstanceRow {
                instance: level.paint(row.instance),
                avg_usage: level.paint(row.avg_usage),
                curr_usage: level.paint(row.curr_usage),
            }
        })
        .collect();
    print_table(&rows);

    if let Some(tip) = entitlement_tip(&report.instance_reports) {
        print_tip(&tip.cyan().to_string());
    }
    for warning in spike_warnings(&report.instance_reports) {
        print_warning(&warning.yellow().to_string());
    }
}

fn header(report: &ApplicationReport) -> String {
    format!(
        "Showing CPU usage against entitlement for app {} in org {} / space {} as {} ...",
        report.application_name.cyan().bold(),
        report.org.cyan().bold(),
        report.space.cyan().bold(),
        report.username.cyan().bold(),
    )
}

fn instance_row(report: &InstanceReport) -> InstanceRow {
    InstanceRow {
        instance: format!("#{}", report.instance_id),
        avg_usage: format_usage(report.historical_usage.value),
        curr_usage: format_usage(report.current_usage.value),
    }
}

/// Advice when any instance is over or near entitlement, "over" taking precedence
fn entitlement_tip(reports: &[InstanceReport]) -> Option<String> {
    let status = match reports
        .iter()
        .map(|r| UsageLevel::of(r.historical_usage.value))
        .max()?
    {
        UsageLevel::Over => "over",
        UsageLevel::Near => "near",
        UsageLevel::Normal => return None,
    };
    Some(format!(
        "Some instances are {} their CPU entitlement. Consider scaling your memory or instances.",
        status
    ))
}

/// One warning per instance within entitlement on average that spiked over it
fn spike_warnings(reports: &[InstanceReport]) -> Vec<String> {
    reports
        .iter()
        .filter(|r| r.historical_usage.value <= 1.0)
        .filter_map(|r| {
            let spike = r.historical_usage.last_spike?;
            Some(if spike.is_instant() {
                format!(
                    "Instance #{} was over entitlement at {}",
                    r.instance_id,
                    format_time(spike.from)
                )
            } else {
                format!(
                    "Instance #{} was over entitlement from {} to {}",
                    r.instance_id,
                    format_time(spike.from),
                    format_time(spike.to)
                )
            })
        })
        .collect()
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use entitlement_lib::{CurrentUsage, HistoricalUsage, Spike};

    fn instance(instance_id: u32, historical: f64, current: f64) -> InstanceReport {
        InstanceReport {
            instance_id,
            historical_usage: HistoricalUsage {
                value: historical,
                last_spike: None,
            },
            current_usage: CurrentUsage { value: current },
        }
    }

    fn with_spike(mut report: InstanceReport, from: i64, to: i64) -> InstanceReport {
        report.historical_usage.last_spike = Some(Spike {
            from: Utc.timestamp_opt(from, 0).unwrap(),
            to: Utc.timestamp_opt(to, 0).unwrap(),
        });
        report
    }

    #[test]
    fn test_instance_row() {
        assert_eq!(
            instance_row(&instance(3, 0.5, 1.234)),
            InstanceRow {
                instance: "#3".to_string(),
                avg_usage: "50.00%".to_string(),
                curr_usage: "123.40%".to_string(),
            }
        );
    }

    #[test]
    fn test_usage_level_thresholds() {
        assert_eq!(UsageLevel::of(0.95), UsageLevel::Normal);
        assert_eq!(UsageLevel::of(0.951), UsageLevel::Near);
        assert_eq!(UsageLevel::of(1.0), UsageLevel::Near);
        assert_eq!(UsageLevel::of(1.01), UsageLevel::Over);
    }

    #[test]
    fn test_tip_prefers_over() {
        let reports = [instance(0, 0.97, 0.0), instance(1, 1.5, 0.0)];
        assert_eq!(
            entitlement_tip(&reports).unwrap(),
            "Some instances are over their CPU entitlement. Consider scaling your memory or instances."
        );

        let reports = [instance(0, 0.5, 0.0), instance(1, 0.97, 0.0)];
        assert!(entitlement_tip(&reports).unwrap().contains("are near their"));

        let reports = [instance(0, 0.5, 2.0)];
        assert_eq!(entitlement_tip(&reports), None);
        assert_eq!(entitlement_tip(&[]), None);
    }

    #[test]
    fn test_spike_warnings() {
        let reports = [
            with_spike(instance(0, 0.5, 0.0), 1_700_000_000, 1_700_000_000),
            with_spike(instance(1, 0.8, 0.0), 1_700_000_000, 1_700_003_600),
            with_spike(instance(2, 1.2, 0.0), 1_700_000_000, 1_700_003_600),
            instance(3, 0.4, 0.0),
        ];

        assert_eq!(
            spike_warnings(&reports),
            vec![
                "Instance #0 was over entitlement at 2023-11-14 22:13:20".to_string(),
                "Instance #1 was over entitlement from 2023-11-14 22:13:20 to 2023-11-14 23:13:20"
                    .to_string(),
            ]
        );
    }
}

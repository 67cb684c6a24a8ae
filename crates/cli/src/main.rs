//! CPU entitlement CLI
//!
//! Reports how much CPU the instances of a Cloud Foundry application use
//! against their entitlement, and which applications of an org are over it.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use entitlement_lib::EntitlementError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ConfigError, Overrides, Settings};
use crate::output::{print_error, LogFormat, OutputFormat};

const FEATURE_HINT: &str =
    "Your Cloud Foundry may not have enabled the CPU Entitlements feature. Please consult your operator.";

/// CPU entitlement usage reporter
#[derive(Parser)]
#[command(name = "cpu-entitlement")]
#[command(author, version, about = "Report CPU usage against entitlement for Cloud Foundry apps", long_about = None)]
pub struct Cli {
    /// Cloud Controller URL (can also be set via CPU_ENTITLEMENT_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Log-cache URL (derived from the API URL if not specified)
    #[arg(long, global = true)]
    pub log_cache_url: Option<String>,

    /// Targeted organization
    #[arg(long, global = true)]
    pub org: Option<String>,

    /// Targeted space
    #[arg(long, global = true)]
    pub space: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long, global = true)]
    pub skip_ssl_validation: bool,

    /// Config file (defaults to ~/.config/cpu-entitlement/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log line format
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show CPU usage against entitlement for each instance of an app
    #[command(visible_alias = "cpu")]
    App {
        /// Application name
        app_name: String,
    },

    /// List apps of the org with instances over their CPU entitlement
    #[command(visible_alias = "oei")]
    OverEntitlementInstances,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            api_url: self.api_url.clone(),
            log_cache_url: self.log_cache_url.clone(),
            org: self.org.clone(),
            space: self.space.clone(),
            skip_ssl_validation: self.skip_ssl_validation,
        }
    }
}

fn init_tracing(debug: bool, format: LogFormat) {
    let default_filter = if debug {
        "entitlement_lib=debug,cpu_entitlement=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())?;

    match &cli.command {
        Commands::App { app_name } => {
            commands::app::show_app_usage(&settings, app_name, cli.format).await
        }
        Commands::OverEntitlementInstances => {
            commands::oei::show_over_entitlement_instances(&settings, cli.format).await
        }
    }
}

/// Failures not caused by the user's input or the app itself may mean the
/// platform does not emit entitlement metrics at all
fn needs_feature_hint(err: &anyhow::Error) -> bool {
    err.downcast_ref::<EntitlementError>().is_none() && err.downcast_ref::<ConfigError>().is_none()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            print_error(&format!("{:#}", err));
            if needs_feature_hint(&err) {
                print_error(FEATURE_HINT);
            }
            ExitCode::FAILURE
        }
    }
}

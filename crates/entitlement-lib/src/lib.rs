//! CPU entitlement usage reporting engine
//!
//! This crate provides the core functionality for:
//! - Resolving the live process instance behind each application instance
//! - Fetching cumulative, current and historical entitlement usage
//! - Building per-instance reports with last-spike detection
//! - Classifying an organization's applications as over or under entitlement

pub mod error;
pub mod fetchers;
pub mod models;
pub mod report;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use error::EntitlementError;
pub use fetchers::{
    CumulativeUsageFetcher, CurrentUsageFetcher, HistoricalUsageFetcher, ProcessInstanceResolver,
    UsageFetcher,
};
pub use models::*;
pub use report::{AppReporter, OverEntitlementReporter, Reporter, SpikeDetector};
pub use source::{Catalog, MetricsSource};

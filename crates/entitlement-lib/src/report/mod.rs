//! Usage reports built from fetched entitlement data
//!
//! This module provides:
//! - Last-spike detection over a historical series
//! - Per-instance reports merging historical and current usage
//! - Application reports with their org/space/user context
//! - Organization-wide over-entitlement classification

mod app;
mod builder;
mod fleet;
mod spike_detector;

pub use app::AppReporter;
pub use builder::Reporter;
pub use fleet::OverEntitlementReporter;
pub use spike_detector::{SpikeDetector, ENTITLEMENT_THRESHOLD};

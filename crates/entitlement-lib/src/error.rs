//! Domain errors raised by the reporters and catalog implementations
//!
//! Backend failures are not wrapped: they travel through `anyhow::Error`
//! exactly as the collaborator returned them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntitlementError {
    /// The app runs instances but the platform emits no entitlement metrics for it
    #[error(
        "Could not find any CPU data for app {app}. Make sure that you are using cf-deployment version >= v5.5.0."
    )]
    UnsupportedDeployment { app: String },

    #[error("App '{name}' not found")]
    AppNotFound { name: String },

    #[error("Organization '{name}' not found")]
    OrgNotFound { name: String },

    #[error("Space '{name}' not found")]
    SpaceNotFound { name: String },
}

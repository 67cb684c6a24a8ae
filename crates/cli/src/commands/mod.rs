//! CLI commands

pub mod app;
pub mod oei;

use crate::client::{CloudControllerClient, LogCacheClient, TransportConfig};
use crate::config::Settings;
use anyhow::Result;
use entitlement_lib::{Catalog, MetricsSource};
use std::sync::Arc;

/// Platform clients built from the loaded settings
pub struct Clients {
    pub metrics: Arc<dyn MetricsSource>,
    pub catalog: Arc<dyn Catalog>,
}

impl Clients {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let transport = TransportConfig {
            skip_ssl_validation: settings.skip_ssl_validation,
            timeout: settings.request_timeout(),
        };
        let access_token = settings.access_token()?;

        let metrics = LogCacheClient::new(settings.log_cache_url()?, access_token, &transport)?;
        let catalog = CloudControllerClient::new(
            settings.api_url()?,
            access_token,
            &transport,
            settings.org()?,
            settings.space.clone().unwrap_or_default(),
            settings.username(),
        )?;

        Ok(Self {
            metrics: Arc::new(metrics),
            catalog: Arc::new(catalog),
        })
    }
}

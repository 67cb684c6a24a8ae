//! Cloud Controller v3 client

use super::{ApiClient, TransportConfig};
use anyhow::Result;
use async_trait::async_trait;
use entitlement_lib::{Application, Catalog, EntitlementError, Space};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Application catalog of the targeted org and space
pub struct CloudControllerClient {
    api: ApiClient,
    org: String,
    space: String,
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Page<T> {
    #[serde(default)]
    pagination: Pagination,
    #[serde(default)]
    resources: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

/// The fields shared by orgs, spaces and apps
#[derive(Debug, Clone, Deserialize)]
struct Resource {
    guid: String,
    name: String,
}

impl CloudControllerClient {
    pub fn new(
        base_url: Url,
        access_token: &str,
        transport: &TransportConfig,
        org: impl Into<String>,
        space: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, access_token, transport)?,
            org: org.into(),
            space: space.into(),
            username: username.into(),
        })
    }

    /// Fetch every page of a listing
    async fn list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let mut page: Page<T> = self.api.get(path, query).await?;
        let mut resources = std::mem::take(&mut page.resources);

        while let Some(next) = page.pagination.next.take() {
            debug!(href = %next.href, "Following pagination link");
            page = self.api.get_url(&next.href).await?;
            resources.append(&mut page.resources);
        }

        Ok(resources)
    }

    async fn org_guid(&self) -> Result<String> {
        let orgs: Vec<Resource> = self
            .list("v3/organizations", &[("names", self.org.clone())])
            .await?;
        orgs.into_iter()
            .next()
            .map(|org| org.guid)
            .ok_or_else(|| {
                EntitlementError::OrgNotFound {
                    name: self.org.clone(),
                }
                .into()
            })
    }

    async fn space_guid(&self, org_guid: &str) -> Result<String> {
        let spaces: Vec<Resource> = self
            .list(
                "v3/spaces",
                &[
                    ("names", self.space.clone()),
                    ("organization_guids", org_guid.to_string()),
                ],
            )
            .await?;
        spaces
            .into_iter()
            .next()
            .map(|space| space.guid)
            .ok_or_else(|| {
                EntitlementError::SpaceNotFound {
                    name: self.space.clone(),
                }
                .into()
            })
    }
}

#[async_trait]
impl Catalog for CloudControllerClient {
    async fn get_spaces(&self) -> Result<Vec<Space>> {
        let org_guid = self.org_guid().await?;
        let spaces: Vec<Resource> = self
            .list("v3/spaces", &[("organization_guids", org_guid)])
            .await?;

        let mut result = Vec::with_capacity(spaces.len());
        for space in spaces {
            let apps: Vec<Resource> = self
                .list("v3/apps", &[("space_guids", space.guid.clone())])
                .await?;
            result.push(Space {
                name: space.name,
                applications: apps
                    .into_iter()
                    .map(|app| Application::new(app.name, app.guid))
                    .collect(),
            });
        }

        debug!(org = %self.org, spaces = result.len(), "Listed spaces");
        Ok(result)
    }

    async fn get_current_org(&self) -> Result<String> {
        Ok(self.org.clone())
    }

    async fn get_current_space(&self) -> Result<String> {
        Ok(self.space.clone())
    }

    async fn get_application(&self, name: &str) -> Result<Application> {
        let org_guid = self.org_guid().await?;
        let space_guid = self.space_guid(&org_guid).await?;
        let apps: Vec<Resource> = self
            .list(
                "v3/apps",
                &[("names", name.to_string()), ("space_guids", space_guid)],
            )
            .await?;

        apps.into_iter()
            .next()
            .map(|app| Application::new(app.name, app.guid))
            .ok_or_else(|| {
                EntitlementError::AppNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    async fn username(&self) -> Result<String> {
        Ok(self.username.clone())
    }
}

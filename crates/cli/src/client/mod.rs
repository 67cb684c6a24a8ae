//! HTTP clients for the platform APIs
//!
//! - `LogCacheClient`: metrics source backed by log-cache
//! - `CloudControllerClient`: application catalog backed by the v3 API

mod cloud_controller;
mod log_cache;

pub use cloud_controller::CloudControllerClient;
pub use log_cache::LogCacheClient;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// TLS and timeout settings shared by every client
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub skip_ssl_validation: bool,
    pub timeout: Duration,
}

impl TransportConfig {
    /// Build an HTTP client honouring these settings
    pub fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.skip_ssl_validation)
            .build()
            .context("Failed to create HTTP client")
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            skip_ssl_validation: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Authenticated JSON client rooted at one base URL
pub struct ApiClient {
    client: Client,
    base_url: Url,
    authorization: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: Url, access_token: &str, transport: &TransportConfig) -> Result<Self> {
        Ok(Self {
            client: transport.build_client()?,
            base_url,
            authorization: authorization_header(access_token),
        })
    }

    /// Make a GET request relative to the base URL
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        self.send(self.client.get(url).query(query)).await
    }

    /// Make a GET request to an absolute URL, such as a pagination link
    pub async fn get_url<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let url = Url::parse(url).with_context(|| format!("Invalid URL '{}'", url))?;
        self.send(self.client.get(url)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()
            .await
            .context("Failed to send request")?;

        debug!(url = %response.url(), status = %response.status(), "API response");

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

/// Authorization header value for a token given with or without its scheme
fn authorization_header(access_token: &str) -> String {
    let token = access_token.trim();
    match token.split_once(' ') {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("bearer") => token.to_string(),
        _ => format!("bearer {}", token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        pong: bool,
    }

    fn client(server: &mockito::Server) -> ApiClient {
        ApiClient::new(
            Url::parse(&server.url()).unwrap(),
            "bearer secret",
            &TransportConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(authorization_header("abc"), "bearer abc");
        assert_eq!(authorization_header("bearer abc"), "bearer abc");
        assert_eq!(authorization_header(" Bearer abc\n"), "Bearer abc");
    }

    #[tokio::test]
    async fn test_get_sends_token_and_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_header("authorization", "bearer secret")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "a b".into()))
            .with_body(r#"{"pong": true}"#)
            .create_async()
            .await;

        let pong: Pong = client(&server)
            .get("ping", &[("q", "a b".to_string())])
            .await
            .unwrap();

        assert_eq!(pong, Pong { pong: true });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ping")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let err = client(&server)
            .get::<Pong>("ping", &[])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "API error (401 Unauthorized): unauthorized");
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ping")
            .with_body("not json")
            .create_async()
            .await;

        let err = client(&server)
            .get::<Pong>("ping", &[])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to parse response");
    }
}

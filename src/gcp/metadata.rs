//! Compute Engine metadata server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default metadata server address; `GCE_METADATA_HOST` overrides it.
const DEFAULT_HOST: &str = "169.254.169.254";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What the server needs to know about where it runs.
///
/// The production implementation is [`MetadataClient`]; tests substitute
/// fakes to exercise both environments.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// Whether a metadata server answers, i.e. we are on Compute Engine.
    async fn on_gce(&self) -> bool;
    async fn project_id(&self) -> Result<String>;
    async fn instance_name(&self) -> Result<String>;
}

/// HTTP client for the metadata server.
#[derive(Clone, Debug)]
pub struct MetadataClient {
    http: Client,
    host: String,
}

/// An OAuth2 access token from the instance's default service account.
#[derive(Debug, Deserialize)]
pub struct InstanceToken {
    pub access_token: String,
    pub expires_in: u64,
}

impl MetadataClient {
    pub fn new() -> Self {
        let host = std::env::var("GCE_METADATA_HOST")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let http = Client::builder()
            .connect_timeout(PROBE_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self { http, host }
    }

    async fn get(&self, suffix: &str) -> Result<String> {
        let url = format!("http://{}/computeMetadata/v1/{suffix}", self.host);
        let res = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Error::Metadata(format!("{suffix}: status {}", res.status())));
        }
        Ok(res.text().await?.trim().to_owned())
    }

    /// Access token for the instance's default service account.
    pub async fn token(&self) -> Result<InstanceToken> {
        let body = self.get("instance/service-accounts/default/token").await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl Default for MetadataClient {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl MetadataProbe for MetadataClient {
    async fn on_gce(&self) -> bool {
        let res = self
            .http
            .get(format!("http://{}", self.host))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match res {
            Ok(res) => res
                .headers()
                .get("metadata-flavor")
                .is_some_and(|v| v.as_bytes() == b"Google"),
            Err(_) => false,
        }
    }

    async fn project_id(&self) -> Result<String> {
        let id = self.get("project/project-id").await?;
        if id.is_empty() {
            return Err(Error::Metadata("empty project id".into()));
        }
        Ok(id)
    }

    async fn instance_name(&self) -> Result<String> {
        self.get("instance/name").await
    }
}

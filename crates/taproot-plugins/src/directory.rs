//! Community plugin directory client
//!
//! Read-only HTTP lookups against the hosted plugin index: the list of
//! published plugins, and an individual plugin's manifest so the user
//! can preview its permissions before installing. Installation itself
//! is local (see `service`); the registry never touches the network.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::manifest::{PluginManifest, validate_manifest};
use crate::{PluginError, PluginResult};

/// Default hosted index
pub const DEFAULT_INDEX_URL: &str = "https://plugins.taproot.money/index.json";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One published plugin in the community index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    /// Where the full manifest (with permissions) can be fetched
    pub manifest_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// Client for the hosted community plugin index
pub struct DirectoryClient {
    index_url: String,
    http: reqwest::Client,
}

impl DirectoryClient {
    pub fn new(index_url: impl Into<String>) -> PluginResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("taproot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PluginError::Directory(e.to_string()))?;

        Ok(Self {
            index_url: index_url.into(),
            http,
        })
    }

    /// Fetch the published plugin list
    pub async fn fetch_index(&self) -> PluginResult<Vec<DirectoryEntry>> {
        let response = self
            .http
            .get(&self.index_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PluginError::Directory(e.to_string()))?;

        response
            .json::<Vec<DirectoryEntry>>()
            .await
            .map_err(|e| PluginError::Directory(format!("Invalid index: {e}")))
    }

    /// Fetch one plugin's manifest for a permission preview.
    ///
    /// The manifest is validated with community rules so a hostile index
    /// entry cannot preview its way past the namespace convention.
    pub async fn fetch_manifest(&self, entry: &DirectoryEntry) -> PluginResult<PluginManifest> {
        let response = self
            .http
            .get(&entry.manifest_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PluginError::Directory(e.to_string()))?;

        let manifest = response
            .json::<PluginManifest>()
            .await
            .map_err(|e| PluginError::Directory(format!("Invalid manifest: {e}")))?;

        validate_manifest(&manifest, false)?;
        Ok(manifest)
    }
}

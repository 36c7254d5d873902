use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ToolupError;
use crate::upgrade::download::get_bytes;

/// Placeholder substituted in `sourceTpl`.
const TEMPLATE_PLACEHOLDER: &str = "%s";

/// The remote update descriptor.
///
/// Fetched once per run and never modified afterwards. Field names on the wire
/// are fixed:
///
/// ```json
/// {
///   "version": "1.3.0",
///   "assets": ["update.exe", "https://cdn.example.com/extra.dll"],
///   "notices": ["Maintenance on Friday"],
///   "versionNotices": ["1.3.0 drops support for legacy installs"],
///   "sourceTpl": "https://downloads.example.com/%s/toolup.zip"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDescriptor {
    /// Advertised target version.
    pub version: String,

    /// Extra files to place next to the executable. Plain names are resolved
    /// through `sourceTpl`; absolute URLs are fetched as-is.
    #[serde(default)]
    pub assets: Vec<String>,

    /// Shown on every run.
    #[serde(default, rename = "notices")]
    pub general_warnings: Vec<String>,

    /// Shown only when an upgrade is found.
    #[serde(default, rename = "versionNotices")]
    pub version_warnings: Vec<String>,

    #[serde(rename = "sourceTpl")]
    pub source_url_template: String,
}

impl UpdateDescriptor {
    /// Parse a descriptor body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| {
            ToolupError::ParseError {
                subject: "update descriptor".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Substitute `value` for the first placeholder in the source template.
    #[must_use]
    pub fn resolve(&self, value: &str) -> String {
        self.source_url_template.replacen(TEMPLATE_PLACEHOLDER, value, 1)
    }

    /// URL of the primary artifact for `version`.
    #[must_use]
    pub fn artifact_url(&self, version: &str) -> String {
        self.resolve(version)
    }

    /// URL of an auxiliary asset.
    #[must_use]
    pub fn asset_url(&self, asset: &str) -> String {
        if is_absolute_url(asset) {
            asset.to_string()
        } else {
            self.resolve(asset)
        }
    }
}

pub(crate) fn is_absolute_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Retrieves the [`UpdateDescriptor`] from a fixed URL.
///
/// There is no retry: a transport failure or non-success status is a
/// [`ToolupError::NetworkError`] and aborts the run; malformed content is a
/// [`ToolupError::ParseError`].
pub struct MetadataFetcher {
    client: reqwest::Client,
    url: String,
}

impl MetadataFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<UpdateDescriptor> {
        debug!("Fetching update descriptor from {}", self.url);
        let body = get_bytes(&self.client, &self.url).await?;
        let descriptor = UpdateDescriptor::parse(&body)?;
        debug!(
            "Descriptor advertises {} with {} asset(s)",
            descriptor.version,
            descriptor.assets.len()
        );
        Ok(descriptor)
    }
}

//! Sequential HTTP transfers for the primary artifact, its checksum sidecar and
//! the descriptor's auxiliary assets.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::ToolupError;
use crate::upgrade::descriptor::{UpdateDescriptor, is_absolute_url};
use crate::utils::fs::ensure_parent_dir;
use crate::utils::progress::DownloadProgress;

/// Suffix appended to the artifact URL to locate its checksum sidecar.
pub const CHECKSUM_SUFFIX: &str = ".checksum.txt";

fn network_error(operation: &str, url: &str, reason: impl ToString) -> anyhow::Error {
    ToolupError::NetworkError {
        operation: format!("{operation} {url}"),
        reason: reason.to_string(),
    }
    .into()
}

async fn send(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let response = client.get(url).send().await.map_err(|e| network_error("GET", url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(network_error("GET", url, format!("server responded with {status}")));
    }
    Ok(response)
}

/// Fetch a small body (descriptor, sidecar) fully into memory.
pub(crate) async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = send(client, url).await?;
    let bytes = response.bytes().await.map_err(|e| network_error("read body of", url, e))?;
    Ok(bytes.to_vec())
}

/// Stream `url` into `dest`, showing a progress bar when the length is known.
///
/// Returns the number of bytes written. A partially written file is left for
/// the caller's staging directory to clean up; transfers are never resumed.
pub(crate) async fn fetch_to_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let mut response = send(client, url).await?;
    let length = response.content_length();
    if length.is_none() {
        debug!("GET {url} (length unknown)");
    }
    let progress = DownloadProgress::new(length);

    ensure_parent_dir(dest)?;
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| ToolupError::file_system("create file", dest))?;

    let mut written = 0u64;
    while let Some(chunk) =
        response.chunk().await.map_err(|e| network_error("download", url, e))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| ToolupError::file_system("write file", dest))?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    file.flush().await.with_context(|| ToolupError::file_system("write file", dest))?;
    progress.finish();

    debug!("Downloaded {written} bytes from {url} to {}", dest.display());
    Ok(written)
}

/// Files produced by [`ArtifactDownloader::download_artifact`].
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    pub url: String,
    pub archive: PathBuf,
    pub sidecar: PathBuf,
}

/// Downloads everything an update needs, one transfer at a time.
pub struct ArtifactDownloader<'a> {
    client: reqwest::Client,
    descriptor: &'a UpdateDescriptor,
}

impl<'a> ArtifactDownloader<'a> {
    pub fn new(client: reqwest::Client, descriptor: &'a UpdateDescriptor) -> Self {
        Self {
            client,
            descriptor,
        }
    }

    /// Download the primary archive for `version` and its checksum sidecar
    /// into `staging`.
    pub async fn download_artifact(&self, version: &str, staging: &Path) -> Result<DownloadedArtifact> {
        let url = self.descriptor.artifact_url(version);
        let archive = staging.join(format!("toolup-{version}.zip"));
        let sidecar = staging.join(format!("toolup-{version}.zip{CHECKSUM_SUFFIX}"));

        fetch_to_file(&self.client, &url, &archive).await?;
        fetch_to_file(&self.client, &format!("{url}{CHECKSUM_SUFFIX}"), &sidecar).await?;

        Ok(DownloadedArtifact {
            url,
            archive,
            sidecar,
        })
    }

    /// Download every auxiliary asset into `dest` under its declared name.
    ///
    /// Returns the written paths in descriptor order.
    pub async fn download_assets(&self, dest: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.descriptor.assets.len());
        for asset in &self.descriptor.assets {
            let url = self.descriptor.asset_url(asset);
            let path = dest.join(asset_file_name(asset)?);
            debug!("Fetching asset {asset} from {url}");
            fetch_to_file(&self.client, &url, &path).await?;
            written.push(path);
        }
        Ok(written)
    }
}

/// The file name an asset is stored under.
///
/// A plain name must be a single path component. For an absolute URL the last
/// path segment is used, ignoring any query or fragment.
pub fn asset_file_name(asset: &str) -> Result<String> {
    let name = if is_absolute_url(asset) {
        let path = asset.split(['?', '#']).next().unwrap_or(asset);
        let after_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
        match after_scheme.split_once('/') {
            Some((_, segments)) => segments.rsplit('/').next().unwrap_or(""),
            None => "",
        }
        .to_string()
    } else {
        asset.to_string()
    };

    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains(':');
    if !valid {
        return Err(ToolupError::ParseError {
            subject: format!("asset name '{asset}'"),
            reason: "assets must name a single file".to_string(),
        }
        .into());
    }
    Ok(name)
}

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::upgrade::archive::ArchiveExtractor;
use crate::upgrade::backup::BackupManager;
use crate::upgrade::config::UpdaterConfig;
use crate::upgrade::descriptor::{MetadataFetcher, UpdateDescriptor};
use crate::upgrade::download::ArtifactDownloader;
use crate::upgrade::helper::PendingReplacement;
use crate::upgrade::replacer::InPlaceReplacer;
use crate::upgrade::verification::ChecksumVerifier;
use crate::upgrade::version_check::{GateDecision, NoticeStyle, VersionGate};
use crate::utils::fs::TempDir;
use crate::utils::platform::Platform;

/// Result of [`SelfUpdater::stage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Nothing to do; no artifact was downloaded.
    UpToDate {
        installed: String,
        advertised: String,
    },
    /// Support files are in place and the executable waits in `.update/`.
    /// The caller hands the record to the replace helper and exits.
    Staged(PendingReplacement),
}

/// Runs the main-process half of an upgrade.
///
/// `SelfUpdater` drives every step that can safely happen while the current
/// executable is running:
///
/// 1. fetch the update descriptor and print its notices
/// 2. compare versions, stopping early when already up to date
/// 3. download the artifact and its checksum sidecar into a temporary directory
/// 4. verify the checksum (nothing is extracted before this succeeds)
/// 5. extract the artifact and download auxiliary assets next to it
/// 6. snapshot the installation into the retained backup
/// 7. copy support files into place and park the new executable in `.update/`
///
/// The final swap is left to the replace helper, see
/// [`helper::launch`](crate::upgrade::helper::launch). Any error aborts the run
/// immediately; the temporary directory is removed either way.
///
/// # Examples
///
/// ```rust,no_run
/// use toolup_cli::upgrade::{SelfUpdater, UpgradeOutcome, UpdaterConfig, helper};
/// use toolup_cli::utils::NativePlatform;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpdaterConfig::default();
/// let platform = NativePlatform;
/// let updater = SelfUpdater::new(&config, Path::new("/opt/toolup"), &platform);
///
/// let mut stdout = std::io::stdout();
/// if let UpgradeOutcome::Staged(record) = updater.stage(&mut stdout).await? {
///     helper::launch(&record)?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct SelfUpdater<'a> {
    config: &'a UpdaterConfig,
    install_root: PathBuf,
    platform: &'a dyn Platform,
    client: reqwest::Client,
    /// Version of the installed tool.
    current_version: String,
    verbose: bool,
    colorize: bool,
    parent_pid: u32,
}

impl<'a> SelfUpdater<'a> {
    pub fn new(config: &'a UpdaterConfig, install_root: &Path, platform: &'a dyn Platform) -> Self {
        Self {
            config,
            install_root: install_root.to_path_buf(),
            platform,
            client: reqwest::Client::new(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            verbose: false,
            colorize: false,
            parent_pid: std::process::id(),
        }
    }

    pub fn current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Print directory trees and test-run the new executable.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn colorize(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Fetch the descriptor and evaluate the version gate.
    pub async fn check<W: Write>(&self, out: &mut W) -> Result<(UpdateDescriptor, GateDecision)> {
        let fetcher = MetadataFetcher::new(self.client.clone(), &self.config.descriptor_url);
        let descriptor = fetcher.fetch().await?;

        let gate = VersionGate::new(&self.current_version)?;
        let decision = gate.evaluate(&descriptor, &NoticeStyle::new(self.colorize), out)?;
        Ok((descriptor, decision))
    }

    /// The version substituted into the artifact URL.
    fn artifact_version(&self, descriptor: &UpdateDescriptor) -> String {
        match &self.config.artifact_version {
            Some(pinned) => {
                if pinned.trim_start_matches('v') != descriptor.version.trim_start_matches('v') {
                    warn!(
                        "Downloading pinned artifact version {pinned} although the descriptor advertises {}",
                        descriptor.version
                    );
                }
                pinned.clone()
            }
            None => descriptor.version.clone(),
        }
    }

    /// Run every main-process step of the upgrade.
    pub async fn stage<W: Write>(&self, out: &mut W) -> Result<UpgradeOutcome> {
        let (descriptor, decision) = self.check(out).await?;
        let target = match decision {
            GateDecision::UpToDate => {
                info!("Already on latest version {}", self.current_version);
                return Ok(UpgradeOutcome::UpToDate {
                    installed: self.current_version.clone(),
                    advertised: descriptor.version,
                });
            }
            GateDecision::UpgradeAvailable(target) => target,
        };

        writeln!(out, "upgrading from v{} --> v{target}", self.current_version.trim_start_matches('v'))?;
        writeln!(out, "downloading...")?;

        let staging = TempDir::new("update")?;
        let downloader = ArtifactDownloader::new(self.client.clone(), &descriptor);
        let artifact =
            downloader.download_artifact(&self.artifact_version(&descriptor), staging.path()).await?;

        writeln!(out, "verifying checksum...")?;
        ChecksumVerifier::verify_sidecar(&artifact.archive, &artifact.sidecar).await?;

        writeln!(out, "extracting update...")?;
        let build = staging.path().join("build");
        ArchiveExtractor::extract(&artifact.archive, &build)
            .await
            .with_context(|| format!("Failed to extract {}", artifact.url))?;
        downloader.download_assets(&build).await?;

        let exe_name = self.config.executable_file_name();
        if self.verbose {
            writeln!(out, "staged files:")?;
            write_tree(out, &build)?;
            report_version(out, &build.join(&exe_name)).await?;
        }

        writeln!(out, "applying update...")?;
        BackupManager::new(self.config, &self.install_root)
            .create_backup()
            .await
            .context("Failed to back up the installation")?;

        let staged = InPlaceReplacer::new(self.config, &self.install_root, self.platform)
            .apply(&build)
            .await?;

        if self.verbose {
            report_version(out, &staged.staged_executable).await?;
            writeln!(out, "installation:")?;
            write_tree(out, &self.install_root)?;
        }

        debug!("Main-process stage complete for {target}");
        Ok(UpgradeOutcome::Staged(PendingReplacement::new(
            self.config,
            &self.install_root,
            self.parent_pid,
        )))
    }
}

/// Run `<exe> version` and return its trimmed output.
pub async fn query_version(exe: &Path) -> Result<String> {
    let output = tokio::process::Command::new(exe)
        .arg("version")
        .output()
        .await
        .with_context(|| format!("Failed to run {}", exe.display()))?;
    if !output.status.success() {
        anyhow::bail!("{} version exited with {}", exe.display(), output.status);
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        anyhow::bail!("{} version printed nothing", exe.display());
    }
    Ok(version)
}

async fn report_version<W: Write>(out: &mut W, exe: &Path) -> Result<()> {
    match query_version(exe).await {
        Ok(version) => writeln!(out, "  {} version: {version}", exe.display())?,
        Err(e) => {
            warn!("Test run failed: {e:#}");
            writeln!(out, "  {} version: unavailable", exe.display())?;
        }
    }
    Ok(())
}

/// List every entry below `root`, indented by depth.
pub fn write_tree<W: Write>(out: &mut W, root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read directory: {}", root.display()))?;
        let indent = "  ".repeat(entry.depth());
        let suffix = if entry.file_type().is_dir() { "/" } else { "" };
        writeln!(out, "{indent}{}{suffix}", entry.file_name().to_string_lossy())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("lib")).unwrap();
        std::fs::write(temp.path().join("lib/a.dat"), b"a").unwrap();
        std::fs::write(temp.path().join("toolup"), b"x").unwrap();

        let mut out = Vec::new();
        write_tree(&mut out, temp.path()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  lib/\n    a.dat\n  toolup\n");
    }

    #[tokio::test]
    async fn test_query_version_of_non_executable_fails() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        assert!(query_version(temp.path()).await.is_err());
    }
}

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::ToolupError;
use crate::upgrade::config::UpdaterConfig;
use crate::utils::fs::{copy_dir_contents, ensure_dir, replace_file_async};
use crate::utils::platform::Platform;

/// What [`InPlaceReplacer::apply`] left in `.update/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedReplacement {
    /// New executable awaiting the helper.
    pub staged_executable: PathBuf,
    /// Companion installer, when the build ships one.
    pub installer: Option<PathBuf>,
    /// Support files copied straight into the installation root.
    pub files_copied: usize,
}

/// Copies an extracted build into the live installation.
///
/// Everything except the executable is written in place. The executable is
/// parked in `.update/` for the replace helper, since the running image cannot
/// be overwritten by its own process.
pub struct InPlaceReplacer<'a> {
    config: &'a UpdaterConfig,
    install_root: PathBuf,
    platform: &'a dyn Platform,
}

impl<'a> InPlaceReplacer<'a> {
    pub fn new(config: &'a UpdaterConfig, install_root: &Path, platform: &'a dyn Platform) -> Self {
        Self {
            config,
            install_root: install_root.to_path_buf(),
            platform,
        }
    }

    /// Apply the build extracted at `staged_tree`.
    ///
    /// The build must contain the executable; this is checked before anything
    /// in the installation is touched.
    pub async fn apply(&self, staged_tree: &Path) -> Result<StagedReplacement> {
        let exe_name = self.config.executable_file_name();
        let new_executable = staged_tree.join(&exe_name);
        if !new_executable.is_file() {
            return Err(ToolupError::FileSystemError {
                operation: format!("find {exe_name} in the downloaded build"),
                path: staged_tree.display().to_string(),
            }
            .into());
        }

        let update_dir = self.config.update_dir(&self.install_root);
        ensure_dir(&update_dir)?;

        let exe_rel = Path::new(&exe_name);
        let update_rel = Path::new(&self.config.update_dir_name);
        let files_copied =
            copy_dir_contents(staged_tree, &self.install_root, |rel| rel == exe_rel || rel == update_rel)
                .await
                .with_context(|| ToolupError::file_system("copy update", &self.install_root))?;
        debug!("Copied {files_copied} support file(s) into {}", self.install_root.display());

        let staged_executable = self.config.staged_executable(&self.install_root);
        replace_file_async(&new_executable, &staged_executable)
            .await
            .with_context(|| ToolupError::file_system("stage executable", &staged_executable))?;

        let installer_name = self.config.installer_file_name();
        let installer_source = staged_tree.join(&installer_name);
        let installer = if installer_source.is_file() {
            let target = update_dir.join(&installer_name);
            replace_file_async(&installer_source, &target)
                .await
                .with_context(|| ToolupError::file_system("stage installer", &target))?;
            Some(target)
        } else {
            None
        };

        if let Err(e) = self.platform.hide_path(&update_dir) {
            warn!("Could not hide {}: {e:#}", update_dir.display());
        }

        info!("Staged {} for replacement", staged_executable.display());
        Ok(StagedReplacement {
            staged_executable,
            installer,
            files_copied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InstallFixture;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPlatform {
        hidden: Mutex<Vec<PathBuf>>,
    }

    impl Platform for RecordingPlatform {
        fn hide_path(&self, path: &Path) -> Result<()> {
            self.hidden.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn enable_ansi_output(&self) -> bool {
            false
        }
    }

    fn staged_build(config: &UpdaterConfig, with_installer: bool) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(config.executable_file_name()), b"new executable").unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/support.dat"), b"support v2").unwrap();
        if with_installer {
            std::fs::write(dir.path().join(config.installer_file_name()), b"installer").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_executable_is_staged_not_overwritten() {
        let fixture = InstallFixture::new();
        fixture.write("lib/support.dat", b"support v1");
        let build = staged_build(&fixture.config, false);
        let platform = RecordingPlatform::default();

        let replacer = InPlaceReplacer::new(&fixture.config, fixture.root(), &platform);
        let staged = replacer.apply(build.path()).await.unwrap();

        let exe = fixture.config.executable_file_name();
        assert_eq!(fixture.read(&exe), b"old executable");
        assert_eq!(std::fs::read(&staged.staged_executable).unwrap(), b"new executable");
        assert_eq!(fixture.read("lib/support.dat"), b"support v2");
        assert_eq!(staged.files_copied, 1);
        assert_eq!(staged.installer, None);
        assert_eq!(*platform.hidden.lock().unwrap(), vec![fixture.update_dir()]);
    }

    #[tokio::test]
    async fn test_installer_is_staged() {
        let fixture = InstallFixture::new();
        let build = staged_build(&fixture.config, true);
        let platform = RecordingPlatform::default();

        let replacer = InPlaceReplacer::new(&fixture.config, fixture.root(), &platform);
        let staged = replacer.apply(build.path()).await.unwrap();

        let installer = staged.installer.unwrap();
        assert_eq!(installer, fixture.update_dir().join(fixture.config.installer_file_name()));
        assert_eq!(std::fs::read(installer).unwrap(), b"installer");
    }

    #[tokio::test]
    async fn test_build_without_executable_touches_nothing() {
        let fixture = InstallFixture::new();
        fixture.write("lib/support.dat", b"support v1");
        let build = staged_build(&fixture.config, false);
        std::fs::remove_file(build.path().join(fixture.config.executable_file_name())).unwrap();
        let platform = RecordingPlatform::default();

        let replacer = InPlaceReplacer::new(&fixture.config, fixture.root(), &platform);
        assert!(replacer.apply(build.path()).await.is_err());
        assert_eq!(fixture.read("lib/support.dat"), b"support v1");
        assert!(!fixture.update_dir().exists());
    }
}

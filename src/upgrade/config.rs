use crate::utils::platform::executable_file_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Immutable settings for one update or rollback run.
///
/// Every component receives this value by reference at construction instead of
/// reading process-wide constants. It is usually loaded from the `[upgrade]`
/// table of the global configuration file; every field has a default, so an
/// empty table (or no file at all) is valid.
///
/// # Configuration Example
///
/// ```toml
/// [upgrade]
/// descriptor_url = "https://updates.example.com/toolup.json"
/// retention_days = 7
/// poll_interval_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Where the update descriptor (JSON) is fetched from.
    #[serde(default = "default_descriptor_url")]
    pub descriptor_url: String,

    /// Stem of the live executable inside the installation root. The platform
    /// suffix is appended when building paths.
    #[serde(default = "default_executable_name")]
    pub executable_name: String,

    /// Name of the staging subdirectory beneath the installation root.
    #[serde(default = "default_update_dir_name")]
    pub update_dir_name: String,

    /// Fixed file name of the single retained backup archive.
    #[serde(default = "default_backup_file_name")]
    pub backup_file_name: String,

    /// Diagnostic log written by the replace helper into the installation root.
    #[serde(default = "default_helper_log_name")]
    pub helper_log_name: String,

    /// Stem of an optional companion installer shipped in the artifact.
    #[serde(default = "default_installer_name")]
    pub installer_name: String,

    /// How long a backup stays available for rollback.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Interval at which the helper checks whether the parent has exited.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Name under which the deferred backup expiry is registered.
    #[serde(default = "default_cleanup_task_name")]
    pub cleanup_task_name: String,

    /// Download this version of the primary artifact instead of the advertised
    /// one. Only meant for publishers that pin a build independently of the
    /// descriptor's `version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_version: Option<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            descriptor_url: default_descriptor_url(),
            executable_name: default_executable_name(),
            update_dir_name: default_update_dir_name(),
            backup_file_name: default_backup_file_name(),
            helper_log_name: default_helper_log_name(),
            installer_name: default_installer_name(),
            retention_days: default_retention_days(),
            poll_interval_ms: default_poll_interval_ms(),
            cleanup_task_name: default_cleanup_task_name(),
            artifact_version: None,
        }
    }
}

fn default_descriptor_url() -> String {
    "https://raw.githubusercontent.com/aig787/toolup/main/update.json".to_string()
}

fn default_executable_name() -> String {
    "toolup".to_string()
}

fn default_update_dir_name() -> String {
    ".update".to_string()
}

fn default_backup_file_name() -> String {
    "toolup-backup.zip".to_string()
}

fn default_helper_log_name() -> String {
    "toolup-update.log".to_string()
}

fn default_installer_name() -> String {
    "update".to_string()
}

const fn default_retention_days() -> u32 {
    7
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_cleanup_task_name() -> String {
    "RemoveToolupBackup".to_string()
}

impl UpdaterConfig {
    /// Executable file name with the platform suffix, e.g. `toolup.exe`.
    #[must_use]
    pub fn executable_file_name(&self) -> String {
        executable_file_name(&self.executable_name)
    }

    #[must_use]
    pub fn installer_file_name(&self) -> String {
        executable_file_name(&self.installer_name)
    }

    #[must_use]
    pub fn live_executable(&self, install_root: &Path) -> PathBuf {
        install_root.join(self.executable_file_name())
    }

    #[must_use]
    pub fn update_dir(&self, install_root: &Path) -> PathBuf {
        install_root.join(&self.update_dir_name)
    }

    #[must_use]
    pub fn backup_path(&self, install_root: &Path) -> PathBuf {
        self.update_dir(install_root).join(&self.backup_file_name)
    }

    /// Where the new executable waits for the helper.
    #[must_use]
    pub fn staged_executable(&self, install_root: &Path) -> PathBuf {
        self.update_dir(install_root).join(self.executable_file_name())
    }

    #[must_use]
    pub fn helper_log(&self, install_root: &Path) -> PathBuf {
        install_root.join(&self.helper_log_name)
    }

    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpdaterConfig::default();
        assert_eq!(config.update_dir_name, ".update");
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.artifact_version.is_none());
        assert_eq!(config.retention(), chrono::Duration::days(7));
    }

    #[test]
    fn test_empty_table_uses_defaults() {
        let config: UpdaterConfig = toml::from_str("").unwrap();
        assert_eq!(config, UpdaterConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config: UpdaterConfig = toml::from_str(
            r#"
            descriptor_url = "http://127.0.0.1:9/update.json"
            retention_days = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.descriptor_url, "http://127.0.0.1:9/update.json");
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.executable_name, "toolup");
    }

    #[test]
    fn test_layout_paths() {
        let config = UpdaterConfig::default();
        let root = Path::new("/opt/toolup");
        let exe = config.executable_file_name();

        assert_eq!(config.live_executable(root), root.join(&exe));
        assert_eq!(config.backup_path(root), root.join(".update").join("toolup-backup.zip"));
        assert_eq!(config.staged_executable(root), root.join(".update").join(&exe));
        assert_eq!(config.helper_log(root), root.join("toolup-update.log"));
    }
}

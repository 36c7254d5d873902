//! Fixtures for installation roots and update artifacts.

use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

use crate::upgrade::config::UpdaterConfig;

/// Zip `files` (relative name, contents) into an in-memory archive.
///
/// Names ending in `/` become directory entries.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);
    for (name, contents) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A throwaway installation root.
///
/// Contains the live executable (as a plain file) plus whatever else a test
/// writes. The directory is removed when the fixture is dropped.
pub struct InstallFixture {
    dir: tempfile::TempDir,
    pub config: UpdaterConfig,
}

impl InstallFixture {
    pub fn new() -> Self {
        Self::with_config(UpdaterConfig::default())
    }

    pub fn with_config(config: UpdaterConfig) -> Self {
        let fixture = Self {
            dir: tempfile::TempDir::new().unwrap(),
            config,
        };
        fixture.write(&fixture.config.executable_file_name(), b"old executable");
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn update_dir(&self) -> PathBuf {
        self.config.update_dir(self.root())
    }

    pub fn backup_path(&self) -> PathBuf {
        self.config.backup_path(self.root())
    }
}

impl Default for InstallFixture {
    fn default() -> Self {
        Self::new()
    }
}

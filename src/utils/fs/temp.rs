//! Temporary directory management with RAII cleanup.
//!
//! This module provides a `TempDir` struct that automatically cleans up
//! temporary directories when dropped, so staging areas disappear whether the
//! update succeeds or fails.

use crate::utils::fs::dirs::{ensure_dir, remove_dir_all};
use anyhow::Result;
use std::path::{Path, PathBuf};

pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(prefix: &str) -> Result<Self> {
        let temp_dir = std::env::temp_dir();
        let unique_name = format!("toolup_{}_{}", prefix, uuid::Uuid::new_v4());
        let path = temp_dir.join(unique_name);

        ensure_dir(&path)?;

        Ok(Self {
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if let Err(e) = remove_dir_all(&self.path) {
            tracing::debug!("Leaving temporary directory behind: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir() {
        let temp_dir = TempDir::new("test").unwrap();
        let path = temp_dir.path().to_path_buf();

        assert!(path.is_dir());
        std::fs::write(path.join("test.txt"), "test").unwrap();

        drop(temp_dir);
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_dir_custom_prefix() {
        let temp1 = TempDir::new("prefix1").unwrap();
        let temp2 = TempDir::new("prefix2").unwrap();

        assert!(temp1.path().to_string_lossy().contains("toolup_prefix1"));
        assert!(temp2.path().to_string_lossy().contains("toolup_prefix2"));
        assert_ne!(temp1.path(), temp2.path());
    }
}

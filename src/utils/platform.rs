//! Platform-specific capabilities behind a small trait.
//!
//! Two operations differ per operating system and are only ever best effort:
//!
//! - hiding the `.update` staging directory at the file-attribute level
//! - enabling ANSI escape rendering on the console
//!
//! [`NativePlatform`] implements both for the current target. On platforms without
//! the underlying primitive the operation degrades to a no-op, since a
//! dot-prefixed directory is already hidden on Unix and terminals there render
//! ANSI natively.

use anyhow::Result;
use std::path::Path;

#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Append the platform's executable suffix (`.exe` on Windows) to `stem`.
#[must_use]
pub fn executable_file_name(stem: &str) -> String {
    format!("{stem}{}", std::env::consts::EXE_SUFFIX)
}

/// OS capabilities the updater needs but cannot express portably.
pub trait Platform: Send + Sync {
    /// Mark `path` hidden at the file-attribute level.
    fn hide_path(&self, path: &Path) -> Result<()>;

    /// Turn on ANSI rendering for stdout. Returns whether colours can be used.
    fn enable_ansi_output(&self) -> bool;
}

/// [`Platform`] for the target the binary was compiled for.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePlatform;

impl Platform for NativePlatform {
    #[cfg(windows)]
    fn hide_path(&self, path: &Path) -> Result<()> {
        use anyhow::Context;
        use std::os::windows::ffi::OsStrExt;
        use windows::Win32::Storage::FileSystem::{
            FILE_ATTRIBUTE_HIDDEN, FILE_FLAGS_AND_ATTRIBUTES, GetFileAttributesW,
            INVALID_FILE_ATTRIBUTES, SetFileAttributesW,
        };
        use windows::core::PCWSTR;

        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(std::iter::once(0)).collect();

        // SAFETY: `wide` is a NUL-terminated UTF-16 buffer that outlives both calls.
        let current = unsafe { GetFileAttributesW(PCWSTR(wide.as_ptr())) };
        let base = if current == INVALID_FILE_ATTRIBUTES {
            0
        } else {
            current
        };
        unsafe {
            SetFileAttributesW(
                PCWSTR(wide.as_ptr()),
                FILE_FLAGS_AND_ATTRIBUTES(base | FILE_ATTRIBUTE_HIDDEN.0),
            )
        }
        .with_context(|| format!("Failed to set hidden attribute on {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(windows))]
    fn hide_path(&self, path: &Path) -> Result<()> {
        tracing::debug!("No hidden attribute on this platform, leaving {}", path.display());
        Ok(())
    }

    #[cfg(windows)]
    fn enable_ansi_output(&self) -> bool {
        colored::control::set_virtual_terminal(true).is_ok()
    }

    #[cfg(not(windows))]
    fn enable_ansi_output(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_file_name() {
        let name = executable_file_name("toolup");
        if is_windows() {
            assert_eq!(name, "toolup.exe");
        } else {
            assert_eq!(name, "toolup");
        }
    }

    #[test]
    fn test_hide_path_is_best_effort() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join(".update");
        std::fs::create_dir(&dir).unwrap();

        NativePlatform.hide_path(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_ansi_enabled_off_windows() {
        assert!(NativePlatform.enable_ansi_output());
    }
}

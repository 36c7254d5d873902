//! Utility modules shared by the update pipeline.
//!
//! - [`fs`] - directory copies, rename-based file replacement, RAII temp dirs
//! - [`platform`] - the [`platform::Platform`] capability trait
//! - [`progress`] - download progress bars

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{TempDir, ensure_dir, replace_file};
pub use platform::{NativePlatform, Platform, executable_file_name, is_windows};
pub use progress::DownloadProgress;

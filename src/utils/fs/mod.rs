//! File system utilities used by the update pipeline.

pub mod dirs;
pub mod temp;

pub use dirs::{
    copy_dir_contents, ensure_dir, ensure_parent_dir, remove_dir_all, replace_file,
    replace_file_async, replace_symlink,
};
pub use temp::TempDir;

//! Configuration loading.
//!
//! Only a global file exists; the installation itself carries no
//! configuration. See [`global`] for locations and precedence.

pub mod global;

pub use global::{CONFIG_ENV, GlobalConfig};

//! Integration test suite for toolup
//!
//! Drives the `toolup` binary against a loopback update server and a scratch
//! installation directory.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **commands**: argument handling, `version`, exit codes
//! - **upgrade**: up-to-date runs, integrity failures, the full detached swap
//! - **rollback**: restore and unavailability reporting
//! - **helper**: the hidden replace-helper entry point

mod common;

mod commands;
mod helper;
mod rollback;
mod upgrade;

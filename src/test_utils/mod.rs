//! Test utilities for toolup
//!
//! Helpers shared by unit and integration tests:
//! - [`http::TestServer`] serves descriptors, artifacts and sidecars from loopback
//! - [`fixtures`] builds installation roots, zip artifacts and checksums
//!
//! Integration tests reach these through the `test-utils` feature.

pub mod fixtures;
pub mod http;

pub use fixtures::{InstallFixture, sha256_hex, zip_bytes};
pub use http::TestServer;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`. With neither, tests run
/// without a subscriber.
///
/// ```bash
/// RUST_LOG=toolup_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

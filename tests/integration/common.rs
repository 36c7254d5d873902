//! Shared setup for the integration suite.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use toolup_cli::test_utils::{InstallFixture, TestServer, sha256_hex, zip_bytes};
use toolup_cli::upgrade::UpdaterConfig;

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A scratch installation plus the configuration file pointing at `server`.
pub struct TestEnv {
    pub server: TestServer,
    pub install: InstallFixture,
    config_dir: tempfile::TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let server = TestServer::start();
        let config = UpdaterConfig {
            descriptor_url: server.url("/update.json"),
            poll_interval_ms: 50,
            ..UpdaterConfig::default()
        };
        let install = InstallFixture::with_config(config);
        install.write("lib/support.dat", b"support v1");

        let config_dir = tempfile::TempDir::new().unwrap();
        let env = Self {
            server,
            install,
            config_dir,
        };
        let toml = format!(
            "[upgrade]\ndescriptor_url = \"{}\"\npoll_interval_ms = 50\n",
            env.server.url("/update.json")
        );
        std::fs::write(env.config_path(), toml).unwrap();
        env
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("config.toml")
    }

    pub fn root(&self) -> &Path {
        self.install.root()
    }

    pub fn exe_name(&self) -> String {
        self.install.config.executable_file_name()
    }

    /// `toolup` with `--config` and `--install-dir` set for this environment.
    pub fn toolup(&self) -> Command {
        let mut cmd = Command::cargo_bin("toolup").unwrap();
        cmd.env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .env_remove("TOOLUP_CONFIG")
            .env("TOOLUP_NO_PROGRESS", "1")
            .arg("--config")
            .arg(self.config_path())
            .arg("--install-dir")
            .arg(self.root());
        cmd
    }

    pub fn serve_descriptor(&self, version: &str) {
        let descriptor = serde_json::json!({
            "version": version,
            "assets": [],
            "notices": ["scheduled maintenance"],
            "versionNotices": ["read the release notes"],
            "sourceTpl": self.server.url("/dl/%s"),
        });
        self.server.serve("/update.json", descriptor.to_string());
    }

    /// Publish `version` with a build whose executable holds `exe_contents`.
    pub fn publish(&self, version: &str, exe_contents: &[u8]) -> Vec<u8> {
        let exe = self.exe_name();
        let artifact = zip_bytes(&[(exe.as_str(), exe_contents), ("lib/support.dat", b"support v2")]);
        self.serve_descriptor(version);
        self.server.serve(&format!("/dl/{version}"), artifact.clone());
        self.server
            .serve(&format!("/dl/{version}.checksum.txt"), format!("{}  toolup.zip\n", sha256_hex(&artifact)));
        artifact
    }
}

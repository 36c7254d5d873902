use predicates::prelude::*;
use std::time::{Duration, Instant};

use crate::common::{CURRENT_VERSION, TestEnv};

#[test]
fn test_up_to_date_downloads_nothing() {
    let env = TestEnv::new();
    env.publish(CURRENT_VERSION, b"same build");

    env.toolup()
        .arg("upgrade")
        .assert()
        .success()
        .stdout(predicate::str::contains("SCHEDULED MAINTENANCE"))
        .stdout(predicate::str::contains("is up to date"))
        .stdout(predicate::str::contains("READ THE RELEASE NOTES").not());

    assert_eq!(env.server.requests(), vec!["/update.json"]);
    assert!(!env.install.update_dir().exists());
}

#[test]
fn test_checksum_mismatch_fails_without_changes() {
    let env = TestEnv::new();
    env.publish("99.0.0", b"new build");
    env.server.serve("/dl/99.0.0.checksum.txt", "0".repeat(64));

    env.toolup()
        .arg("upgrade")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Integrity check failed"));

    assert_eq!(env.install.read("lib/support.dat"), b"support v1");
    assert_eq!(env.install.read(&env.exe_name()), b"old executable");
    assert!(!env.install.update_dir().exists());
}

#[test]
fn test_unreachable_descriptor_fails() {
    let env = TestEnv::new();

    env.toolup()
        .arg("upgrade")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network error"));
}

// Windows registers a real scheduled task for the cleanup
#[cfg(unix)]
#[test]
fn test_detached_helper_swaps_executable() {
    let env = TestEnv::new();
    env.publish("99.0.0", b"new build");

    env.toolup()
        .arg("upgrade")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("upgrading from v{CURRENT_VERSION} --> v99.0.0")))
        .stdout(predicate::str::contains("READ THE RELEASE NOTES"))
        .stdout(predicate::str::contains("update staged"));

    // Support files are replaced by the main process
    assert_eq!(env.install.read("lib/support.dat"), b"support v2");
    assert!(env.install.backup_path().exists());

    // The executable is swapped by the helper after the main process exited
    let exe = env.install.path(&env.exe_name());
    let deadline = Instant::now() + Duration::from_secs(30);
    while std::fs::read(&exe).unwrap_or_default() != b"new build" {
        assert!(Instant::now() < deadline, "helper did not replace the executable");
        std::thread::sleep(Duration::from_millis(100));
    }

    let staged = env.install.update_dir().join(env.exe_name());
    let log = env.install.path(&env.install.config.helper_log_name);
    let deadline = Instant::now() + Duration::from_secs(30);
    while staged.exists() || log.exists() {
        assert!(Instant::now() < deadline, "helper did not finish");
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(env.install.backup_path().exists());
}

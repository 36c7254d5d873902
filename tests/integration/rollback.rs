use predicates::prelude::*;
use toolup_cli::upgrade::backup::BackupManager;

use crate::common::TestEnv;

#[test]
fn test_rollback_without_backup_is_not_an_error() {
    let env = TestEnv::new();

    for _ in 0..2 {
        env.toolup()
            .args(["upgrade", "rollback"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "no backup available: backups are only available for 7 days after upgrading",
            ));
    }
}

#[tokio::test]
async fn test_rollback_restores_backup() {
    let env = TestEnv::new();
    BackupManager::new(&env.install.config, env.root()).create_backup().await.unwrap();

    env.install.write("lib/support.dat", b"support v2");
    env.install.write(&env.exe_name(), b"new build");

    env.toolup()
        .args(["upgrade", "rollback"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rollback complete"))
        .stdout(predicate::str::contains("restored version"));

    assert_eq!(env.install.read("lib/support.dat"), b"support v1");
    assert_eq!(env.install.read(&env.exe_name()), b"old executable");
    assert!(!env.install.update_dir().exists());
}

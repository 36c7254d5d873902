use toolup_cli::upgrade::PendingReplacement;

use crate::common::TestEnv;

#[test]
fn test_invalid_record_exit_code() {
    let env = TestEnv::new();

    env.toolup().args(["replace-helper", "--record", "not json"]).assert().code(2);
}

#[test]
fn test_missing_source_exit_code_and_log() {
    let env = TestEnv::new();
    // Above any pid_max, so the wait ends on the first poll
    let record = PendingReplacement::new(&env.install.config, env.root(), i32::MAX as u32);

    let encoded = record.encode().unwrap();

    env.toolup()
        .args(["replace-helper", "--record", encoded.as_str()])
        .assert()
        .code(10);

    assert_eq!(env.install.read(&env.exe_name()), b"old executable");
    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert!(log.contains("VALIDATE_SOURCE"));
}

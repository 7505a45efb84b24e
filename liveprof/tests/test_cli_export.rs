use std::process::Command;

fn liveprof() -> Command {
    Command::new(env!("CARGO_BIN_EXE_liveprof"))
}

#[test]
fn test_export_writes_recent_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recent.json");

    let status = liveprof()
        .args(["--transactions", "5", "--steps", "2", "--concurrency", "2", "-q", "--export"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    let raw = std::fs::read_to_string(&path).unwrap();
    let exported: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let transactions = exported.as_array().unwrap();
    assert_eq!(transactions.len(), 5);
    for tx in transactions {
        assert_eq!(tx["category"], "workload");
        assert_ne!(tx["state"], "inflight");
        assert_eq!(tx["steps"].as_array().unwrap().len(), 2);
        assert!(tx["correlationId"].as_str().unwrap().starts_with("demo-"));
    }

    let typed: Vec<liveprof::TransactionSnapshot> = serde_json::from_str(&raw).unwrap();
    assert!(typed.iter().all(|tx| tx.duration >= tx.own_duration));
}

#[test]
fn test_event_logging_run_drains_and_exits() {
    let output = liveprof()
        .args(["--transactions", "4", "--steps", "3", "--concurrency", "2", "--log-events"])
        .env("RUST_LOG", "liveprof::events=info")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("done: "), "stdout: {stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("transaction finish").count(), 4, "stderr: {stderr}");
}

#[test]
fn test_export_respects_max_recent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recent.json");

    let status = liveprof()
        .args(["--transactions", "6", "--steps", "1", "--max-recent", "3", "-q", "--export"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    let exported: Vec<liveprof::TransactionSnapshot> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(exported.len(), 3);
}

#[test]
fn test_invalid_config_exits_with_usage_code() {
    let output = liveprof().args(["--max-recent", "0", "-q"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_recent_transactions"), "stderr: {stderr}");
}

#[test]
fn test_invalid_arguments_rejected_by_clap() {
    let output = liveprof().args(["--transactions", "0"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

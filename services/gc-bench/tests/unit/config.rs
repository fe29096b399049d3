//! Configuration loading tests

use gc_bench::{BenchConfig, ListenerMode, MemoryMode, StartupError};
use pretty_assertions::assert_eq;
use rstest::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[rstest]
#[test]
fn test_full_file_overrides_defaults() {
    let file = write_config(
        r#"
[server]
host = "127.0.0.1"
port = 8080

[listener]
mode = "activation"
unset_environment = false

[workload]
memory_mode = "retained"
memory_elements = 12000
cpu_depth = 0
success_token = "ok"

[diagnostics]
enabled = true
host = "127.0.0.1"
port = 6061
mount_on_primary = false
"#,
    );

    let config = BenchConfig::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.server_address(), "127.0.0.1:8080");
    assert_eq!(config.listener.mode, ListenerMode::Activation);
    assert!(!config.listener.unset_environment);
    assert_eq!(config.workload.memory_mode, MemoryMode::Retained);
    assert_eq!(config.workload.memory_elements, 12_000);
    assert_eq!(config.workload.cpu_depth, 0);
    assert_eq!(config.workload.success_token, "ok");
    assert_eq!(
        config.diagnostics_address().as_deref(),
        Some("127.0.0.1:6061")
    );
}

#[rstest]
#[test]
fn test_partial_file_keeps_remaining_defaults() {
    let file = write_config(
        r#"
[workload]
memory_mode = "off"
"#,
    );

    let config = BenchConfig::from_file(file.path().to_str().unwrap()).unwrap();
    let defaults = BenchConfig::default();
    assert_eq!(config.workload.memory_mode, MemoryMode::Off);
    assert_eq!(config.workload.cpu_depth, defaults.workload.cpu_depth);
    assert_eq!(config.server, defaults.server);
    assert_eq!(config.listener, defaults.listener);
    assert_eq!(config.diagnostics, defaults.diagnostics);
}

#[rstest]
#[test]
fn test_unknown_memory_mode_fails_to_load() {
    let file = write_config(
        r#"
[workload]
memory_mode = "forever"
"#,
    );

    assert!(BenchConfig::from_file(file.path().to_str().unwrap()).is_err());
}

#[rstest]
#[test]
fn test_missing_file_is_an_error() {
    assert!(BenchConfig::from_file("/nonexistent/gc-bench.toml").is_err());
}

#[rstest]
#[case(64, true)]
#[case(65, false)]
#[test]
fn test_cpu_depth_bound(#[case] depth: u32, #[case] valid: bool) {
    let mut config = BenchConfig::default();
    config.workload.cpu_depth = depth;
    match config.validate() {
        Ok(()) => assert!(valid),
        Err(StartupError::Config(_)) => assert!(!valid),
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[test]
fn test_effective_config_serializes() {
    let json = serde_json::to_value(BenchConfig::default()).unwrap();
    assert_eq!(json["workload"]["memory_mode"], "transient");
    assert_eq!(json["listener"]["mode"], "bind");
    assert_eq!(json["server"]["port"], 80);
}

#[rstest]
#[test]
fn test_shipped_config_matches_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/gc-bench.toml");
    let config = BenchConfig::from_file(path).unwrap();
    assert_eq!(config, BenchConfig::default());
}

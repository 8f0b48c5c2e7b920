use dvr::fixture;
use dvr::http::RequestUrl;
use dvr::interaction::{InteractionRecord, RequestRecord, ResponseRecord};
use dvr::run_with_runtime;
use dvr::runtime::{FakeClock, FakeFileSystem, FakeTerminal, ProductionRuntime};
use std::ffi::OsString;
use std::sync::Arc;

fn runtime_with(fs: FakeFileSystem, terminal: &FakeTerminal) -> ProductionRuntime {
    ProductionRuntime {
        clock: Arc::new(FakeClock::default()),
        file_system: Arc::new(fs),
        terminal: Arc::new(terminal.clone()),
    }
}

fn args(values: &[&str]) -> Vec<OsString> {
    std::iter::once("dvr")
        .chain(values.iter().copied())
        .map(OsString::from)
        .collect()
}

fn env(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
    pairs
        .iter()
        .map(|(k, v)| (OsString::from(k), OsString::from(v)))
        .collect()
}

fn interaction(url: &str, status: u16, recorded_at_unix_ms: u64) -> InteractionRecord {
    InteractionRecord {
        request: Some(RequestRecord {
            method: "GET".to_string(),
            url: Some(RequestUrl::parse(url).expect("url")),
            ..RequestRecord::default()
        }),
        response: Some(ResponseRecord {
            status,
            headers: Default::default(),
        }),
        recorded_at_unix_ms,
        ..InteractionRecord::default()
    }
}

#[test]
fn mode_reads_config_file_through_runtime() {
    let fs = FakeFileSystem::with_file(
        "/etc/dvr.toml",
        "[mode]\nrecord = true\n\n[fixture]\npath = \"recorded/api.dvr\"\n",
    );
    let terminal = FakeTerminal::default();
    let runtime = runtime_with(fs, &terminal);

    let code = run_with_runtime(&args(&["--config", "/etc/dvr.toml", "mode"]), &[], &runtime)
        .expect("mode");
    assert_eq!(code, 0);
    assert_eq!(
        terminal.written_lines(),
        vec!["mode=record fixture=recorded/api.dvr".to_string()]
    );
}

#[test]
fn cli_flag_overrides_env_mode() {
    let terminal = FakeTerminal::default();
    let runtime = runtime_with(FakeFileSystem::default(), &terminal);
    run_with_runtime(
        &args(&["mode", "--replay"]),
        &env(&[("DVR_MODE", "record"), ("DVR_FILE", "env.dvr")]),
        &runtime,
    )
    .expect("mode");
    assert_eq!(
        terminal.written_lines(),
        vec!["mode=replay fixture=env.dvr".to_string()]
    );
}

#[test]
fn missing_config_file_is_reported_without_output() {
    let terminal = FakeTerminal::default();
    let runtime = runtime_with(FakeFileSystem::default(), &terminal);
    let err = run_with_runtime(&args(&["--config", "/absent.toml", "mode"]), &[], &runtime)
        .expect_err("missing config");
    assert!(err.to_string().contains("/absent.toml"), "{err}");
    assert!(terminal.written_lines().is_empty());
}

#[test]
fn inspect_writes_one_line_per_interaction_and_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("archive.dvr");
    let records = [
        interaction("http://api.test/a", 200, 50),
        interaction("http://api.test/b", 503, 20),
    ];
    std::fs::write(&path, fixture::encode(&records).expect("encode")).expect("write");

    let terminal = FakeTerminal::default();
    let runtime = runtime_with(FakeFileSystem::default(), &terminal);
    let file = path.to_str().expect("utf8 path");
    run_with_runtime(&args(&["inspect", "--file", file]), &[], &runtime).expect("inspect");

    let lines = terminal.written_lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("#0 GET http://api.test/a -> 200 sha256:"));
    assert!(lines[1].starts_with("#1 GET http://api.test/b -> 503 sha256:"));
    assert_eq!(
        lines[2],
        format!("fixture={file} version=1 interactions=2 oldest_recorded_at_unix_ms=20")
    );
}

#[test]
fn inspect_json_is_a_single_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("archive.dvr");
    std::fs::write(
        &path,
        fixture::encode(&[interaction("http://api.test/a", 201, 7)]).expect("encode"),
    )
    .expect("write");

    let terminal = FakeTerminal::default();
    let runtime = runtime_with(FakeFileSystem::default(), &terminal);
    run_with_runtime(
        &args(&["inspect", "--json"]),
        &env(&[("DVR_FILE", path.to_str().expect("utf8 path"))]),
        &runtime,
    )
    .expect("inspect");

    let lines = terminal.written_lines();
    assert_eq!(lines.len(), 1);
    let summary: serde_json::Value = serde_json::from_str(&lines[0]).expect("json");
    assert_eq!(summary["version"], 1);
    assert_eq!(summary["interactions"][0]["status"], 201);
    assert_eq!(summary["interactions"][0]["recorded_at_unix_ms"], 7);
}

//! Integration tests for the `fleetalarm` CLI binary.
//!
//! Argument parsing, help output, completions and error exit codes run
//! without any backend; the rest run against a wiremock alarm API.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `fleetalarm` binary with env isolation.
///
/// Clears all `FLEETALARM_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn fleetalarm_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fleetalarm");
    cmd.env("HOME", "/tmp/fleetalarm-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/fleetalarm-cli-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("FLEETALARM_PROFILE")
        .env_remove("FLEETALARM_API_URL")
        .env_remove("FLEETALARM_TOKEN")
        .env_remove("FLEETALARM_OUTPUT")
        .env_remove("FLEETALARM_INSECURE")
        .env_remove("FLEETALARM_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so wiremock keeps serving.
async fn run(args: Vec<String>) -> std::process::Output {
    tokio::task::spawn_blocking(move || fleetalarm_cmd().args(args).output().unwrap())
        .await
        .unwrap()
}

fn backend_args(server: &MockServer, rest: &[&str]) -> Vec<String> {
    let mut args = vec![
        "--api-url".to_owned(),
        server.uri(),
        "--token".to_owned(),
        "secret-token".to_owned(),
    ];
    args.extend(rest.iter().map(|s| (*s).to_owned()));
    args
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = fleetalarm_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    fleetalarm_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("watch")
            .and(predicate::str::contains("history"))
            .and(predicate::str::contains("ack"))
            .and(predicate::str::contains("resolve")),
    );
}

#[test]
fn test_version_flag() {
    fleetalarm_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetalarm"));
}

#[test]
fn test_config_subcommands_exist() {
    fleetalarm_cmd()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("show"))
                .and(predicate::str::contains("path"))
                .and(predicate::str::contains("set-token")),
        );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    fleetalarm_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    fleetalarm_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = fleetalarm_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_history_without_config_exits_with_usage_code() {
    let output = fleetalarm_cmd().arg("history").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("config init"), "Expected setup hint:\n{text}");
}

#[test]
fn test_missing_token_exits_with_auth_code() {
    let output = fleetalarm_cmd()
        .args(["--api-url", "http://127.0.0.1:9", "history"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_invalid_output_format() {
    let output = fleetalarm_cmd()
        .args(["--output", "invalid", "history"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

#[test]
fn test_config_path_and_show_without_file() {
    fleetalarm_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
    fleetalarm_cmd().args(["config", "show"]).assert().success();
}

// ── Against a backend ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_history_prints_normalized_alarms() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alarms/historical"))
        .and(query_param("page", "2"))
        .and(query_param("size", "5"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "alarm_id": "H1", "type": "Overspeed", "imei": "truck-7" },
                { "alarmId": "H2", "alarmType": "Collision", "level": "fatal" },
            ]
        })))
        .mount(&server)
        .await;

    let output = run(backend_args(
        &server,
        &["--output", "json", "history", "--page", "2", "--size", "5"],
    ))
    .await;
    assert!(output.status.success(), "{}", combined_output(&output));

    let alarms: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(alarms.len(), 2);
    let h2 = alarms.iter().find(|a| a["id"] == "H2").unwrap();
    assert_eq!(h2["severity"], "critical");
    assert_eq!(h2["status"], "historical");
    assert_eq!(h2["source"], "api");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_history_rejected_token_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alarms/historical"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let output = run(backend_args(&server, &["history"])).await;
    assert_eq!(output.status.code(), Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ack_posts_to_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alarms/A1/acknowledge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(backend_args(&server, &["ack", "A1"])).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("acknowledged"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resolve_unknown_alarm_exits_with_not_found_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alarms/nope/resolve"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such alarm"))
        .mount(&server)
        .await;

    let output = run(backend_args(&server, &["resolve", "nope"])).await;
    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
}

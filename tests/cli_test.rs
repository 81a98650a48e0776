//! Binary integration tests
//!
//! Runs the `native-oidc` binary with temporary configuration files.

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{discovery_body, temp_config_file};

fn config_for(server_url: &str, backend: &str, prefs_path: &str) -> String {
    format!(
        r#"
client:
  client_id: https://rp.example.com/notes
  authorization_server_url: {server_url}
  native_redirect_uri: com.example.notes:/oauth2redirect
  web_redirect_uri: https://rp.example.com/login/oauth2/code/eid
  resource_url: {server_url}/api/notes

http:
  timeout_seconds: 5
  connect_timeout_seconds: 2

preferences:
  backend: {backend}
  path: {prefs_path}
"#
    )
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("native-oidc").unwrap();
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("native-oidc"));
}

#[test]
fn test_pkce_command_prints_pair() {
    let (_dir, config_path) =
        temp_config_file(&config_for("http://127.0.0.1:9", "memory", "unused.json"));

    let mut cmd = Command::cargo_bin("native-oidc").unwrap();
    cmd.arg("--config").arg(&config_path).arg("pkce");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("verifier"))
        .stdout(predicate::str::contains("challenge"))
        .stdout(predicate::str::contains("S256"));
}

#[test]
fn test_invalid_config_fails() {
    let (_dir, config_path) = temp_config_file(
        r#"
client:
  client_id: ""
"#,
    );

    let mut cmd = Command::cargo_bin("native-oidc").unwrap();
    cmd.arg("--config").arg(&config_path).arg("pkce");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("client_id cannot be empty"));
}

#[test]
fn test_native_redirect_with_https_scheme_is_rejected() {
    let (_dir, config_path) = temp_config_file(
        r#"
client:
  native_redirect_uri: https://rp.example.com/callback
"#,
    );

    let mut cmd = Command::cargo_bin("native-oidc").unwrap();
    cmd.arg("--config").arg(&config_path).arg("pkce");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("custom scheme"));
}

#[test]
fn test_callback_ignores_foreign_uri() {
    let (_dir, config_path) =
        temp_config_file(&config_for("http://127.0.0.1:9", "memory", "unused.json"));

    let mut cmd = Command::cargo_bin("native-oidc").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("callback")
        .arg("https://elsewhere.example.com/cb?code=x&state=y");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("ignored"));
}

#[test]
fn test_callback_without_stored_state_fails() {
    let dir = tempfile::tempdir().unwrap();
    let prefs = dir.path().join("preferences.json");
    let (_cfg_dir, config_path) = temp_config_file(&config_for(
        "http://127.0.0.1:9",
        "file",
        &prefs.display().to_string(),
    ));

    let mut cmd = Command::cargo_bin("native-oidc").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("callback")
        .arg("com.example.notes:/oauth2redirect?state=abc&code=ABC123");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("State mismatch"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_discover_prints_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server.uri())))
        .mount(&server)
        .await;

    let (_dir, config_path) = temp_config_file(&config_for(&server.uri(), "memory", "unused.json"));

    let output = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("native-oidc")
            .unwrap()
            .arg("--config")
            .arg(&config_path)
            .arg("discover")
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("{}/authorize", server.uri())), "{stdout}");
    assert!(stdout.contains(&format!("{}/token", server.uri())), "{stdout}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_authorize_print_only_persists_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server.uri())))
        .mount(&server)
        .await;

    let prefs_dir = tempfile::tempdir().unwrap();
    let prefs = prefs_dir.path().join("preferences.json");
    let (_dir, config_path) = temp_config_file(&config_for(
        &server.uri(),
        "file",
        &prefs.display().to_string(),
    ));

    let output = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("native-oidc")
            .unwrap()
            .arg("--config")
            .arg(&config_path)
            .arg("--pkce")
            .arg("authorize")
            .arg("--print-only")
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("code_challenge_method=S256"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("native-oidc --pkce callback"), "{stderr}");

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&prefs).unwrap()).unwrap();
    let state = stored["state"].as_str().unwrap();
    assert!(stdout.contains(&format!("state={state}")), "{stdout}");
    assert!(stored["verifier"].is_string());
}

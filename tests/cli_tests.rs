mod common;

use common::{run_recap, TestEnv};

#[test]
fn recap_help_shows_usage() {
    let output = run_recap(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "--help should succeed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        stderr
    );
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("Commands:"));
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("proxy"));
    assert!(stdout.contains("submit"));
}

#[test]
fn recap_version_shows_version() {
    let output = run_recap(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("recap "));
}

#[test]
fn completions_bash_outputs_script() {
    let output = run_recap(&["completions", "bash"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "completions bash should succeed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        stderr
    );
    assert!(
        stdout.contains("recap"),
        "expected completion output to reference command name\nstdout:\n{}",
        stdout
    );
    assert!(
        !stderr.contains("No config file found"),
        "completions should not load config\nstderr:\n{}",
        stderr
    );
}

#[test]
fn config_path_prints_a_toml_path() {
    let env = TestEnv::new();
    let path = env.config_path();
    assert!(path.to_string_lossy().ends_with("config.toml"));
}

#[test]
fn config_init_writes_and_refuses_overwrite() {
    let env = TestEnv::new();

    let output = env.run(&["config", "init"]);
    assert!(
        output.status.success(),
        "config init should succeed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(env.config_path().exists());

    // Second init without --force must refuse
    let output = env.run(&["config", "init"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("already exists"),
        "expected overwrite refusal, got:\n{}",
        stderr
    );

    let output = env.run(&["config", "init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn config_show_prints_defaults() {
    let output = run_recap(&["config", "show"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("[server]"));
    assert!(stdout.contains("[proxy]"));
    assert!(stdout.contains("bind_addr"));
}

#[test]
fn status_without_server_reports_connection_failure() {
    let env = TestEnv::new();
    // Point the client at a port nothing listens on
    env.run(&["config", "init"]);
    std::fs::write(
        env.config_path(),
        "[server]\nbind_addr = \"127.0.0.1:1\"\n",
    )
    .expect("write config");

    let output = env.run(&["status", "some-task-id"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("recap serve"),
        "expected a hint to start the server, got:\n{}",
        stderr
    );
}

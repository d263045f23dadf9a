//! Unit tests for configuration parsing and validation.

use std::time::Duration;

use agent_turnstile::config::GlobalConfig;
use agent_turnstile::AppError;

fn toml_for(root: &std::path::Path, extra: &str) -> String {
    format!(
        "default_workspace_root = '{}'\n{extra}",
        root.display().to_string().replace('\\', "\\\\")
    )
}

#[test]
fn minimal_config_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&toml_for(dir.path(), "authorized_user_ids = [\"U1\"]"))
        .expect("valid config");

    assert_eq!(config.host_cli, "claude");
    assert!(config.host_cli_args.is_empty());
    assert_eq!(config.timeouts.inactivity(), Duration::from_secs(300));
    assert_eq!(config.timeouts.approval_ttl(), Duration::from_secs(600));
    assert_eq!(config.timeouts.reaper_interval(), Duration::from_secs(60));
    assert_eq!(config.timeouts.shutdown_grace(), Duration::from_secs(5));
    assert!(config.slack.app_token.is_empty(), "tokens never come from toml");
}

#[test]
fn workspace_root_is_canonicalized() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&toml_for(dir.path(), "authorized_user_ids = [\"U1\"]"))
        .expect("valid config");
    let expected = dir.path().canonicalize().expect("canonical");
    assert_eq!(config.default_workspace_root(), expected.as_path());
}

#[test]
fn db_path_defaults_under_workspace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&toml_for(dir.path(), "authorized_user_ids = [\"U1\"]"))
        .expect("valid config");
    assert_eq!(
        config.db_path(),
        config
            .default_workspace_root()
            .join(".agent-turnstile")
            .join("state.db")
    );
}

#[test]
fn explicit_values_override_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let extra = r#"
authorized_user_ids = ["U1", "U2"]
host_cli = "/usr/local/bin/claude"
host_cli_args = ["--model", "sonnet"]
db_path = "/var/lib/turnstile/state.db"

[timeouts]
inactivity_seconds = 30
approval_ttl_seconds = 120
reaper_interval_seconds = 10
shutdown_grace_seconds = 1
"#;
    let config = GlobalConfig::from_toml_str(&toml_for(dir.path(), extra)).expect("valid config");

    assert_eq!(config.host_cli, "/usr/local/bin/claude");
    assert_eq!(config.host_cli_args, vec!["--model", "sonnet"]);
    assert_eq!(
        config.db_path(),
        std::path::PathBuf::from("/var/lib/turnstile/state.db")
    );
    assert_eq!(config.timeouts.inactivity_seconds, 30);
    assert_eq!(config.timeouts.approval_ttl_seconds, 120);
    assert_eq!(config.timeouts.reaper_interval_seconds, 10);
    assert_eq!(config.timeouts.shutdown_grace_seconds, 1);
}

#[test]
fn empty_allowlist_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::from_toml_str(&toml_for(dir.path(), "")).expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("authorized_user_ids")));
}

#[test]
fn blank_host_cli_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::from_toml_str(&toml_for(
        dir.path(),
        "authorized_user_ids = [\"U1\"]\nhost_cli = \"  \"",
    ))
    .expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("host_cli")));
}

#[test]
fn zero_timeout_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::from_toml_str(&toml_for(
        dir.path(),
        "authorized_user_ids = [\"U1\"]\n[timeouts]\napproval_ttl_seconds = 0",
    ))
    .expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("greater than zero")));
}

#[test]
fn missing_workspace_root_is_rejected() {
    let err = GlobalConfig::from_toml_str(
        "default_workspace_root = '/definitely/not/here/xyz'\nauthorized_user_ids = [\"U1\"]",
    )
    .expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("default_workspace_root")));
}

#[test]
fn malformed_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("this is = = not toml").expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn load_from_missing_file_fails() {
    let err = GlobalConfig::load_from_path("/definitely/not/here/config.toml").expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}

#[test]
fn allowlist_membership() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&toml_for(dir.path(), "authorized_user_ids = [\"U1\"]"))
        .expect("valid config");

    assert!(config.is_authorized("U1"));
    assert!(!config.is_authorized("U2"));
    assert!(config.ensure_authorized("U1").is_ok());
    assert!(matches!(
        config.ensure_authorized("U2"),
        Err(AppError::Unauthorized(_))
    ));
}

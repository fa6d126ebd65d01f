//! Configuration tests

use super::*;
use crate::channel::ReconnectPolicy;
use std::collections::HashMap;
use std::time::Duration;

fn no_env(_: &str) -> Option<String> {
    None
}

fn parse(toml_str: &str) -> FileConfig {
    toml::from_str(toml_str).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

/// The template written by `ensure_config_exists` must load back unchanged
#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );

    let loaded = Config::resolve(parsed.unwrap(), no_env);
    assert_eq!(loaded.api_base_url, config.api_base_url);
    assert_eq!(loaded.session, config.session);
    assert_eq!(loaded.channel, config.channel);
    assert_eq!(loaded.list, config.list);
    assert_eq!(loaded.logging.file_dir, config.logging.file_dir);
}

#[test]
fn test_config_roundtrip_escapes_paths() {
    let mut config = Config::default();
    config.session.persistent_dir = PathBuf::from(r#"C:\Users\desk "main""#);
    config.channel.backoff = Backoff::Exponential;

    let loaded = Config::resolve(parse(&config.to_toml()), no_env);

    assert_eq!(loaded.session.persistent_dir, config.session.persistent_dir);
    assert_eq!(loaded.channel.backoff, Backoff::Exponential);
}

// ─────────────────────────────────────────────────────────────────────────────
// Precedence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_defaults_when_file_and_env_are_empty() {
    let config = Config::resolve(FileConfig::default(), no_env);

    assert_eq!(config.api_base_url, DEFAULT_API_URL);
    assert_eq!(config.ws_url, DEFAULT_WS_URL);
    assert_eq!(config.session.login_scope, "me items");
    assert_eq!(config.channel.reconnect_interval_ms, 5000);
    assert_eq!(config.channel.max_reconnect_interval_ms, 60_000);
    assert_eq!(config.list.per_page, 10);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_env_overrides_file() {
    let file = parse(
        r#"
api_base_url = "http://file.example"
ws_url = "ws://file.example/ws"
"#,
    );
    let env: HashMap<&str, &str> = HashMap::from([(ENV_API_URL, "http://env.example")]);

    let config = Config::resolve(file, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.api_base_url, "http://env.example");
    assert_eq!(config.ws_url, "ws://file.example/ws");
}

#[test]
fn test_empty_env_value_is_ignored() {
    let file = parse(r#"api_base_url = "http://file.example""#);
    let config = Config::resolve(file, |key| (key == ENV_API_URL).then(String::new));
    assert_eq!(config.api_base_url, "http://file.example");
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let file = parse(
        r#"
[session]
login_scope = "me"

[logging]
file_enabled = true
file_rotation = "HOURLY"
"#,
    );

    let config = Config::resolve(file, no_env);

    assert_eq!(config.session.login_scope, "me");
    assert_eq!(config.session.session_dir, SessionConfig::default().session_dir);
    assert!(config.logging.file_enabled);
    assert_eq!(config.logging.file_rotation, LogRotation::Hourly);
    assert_eq!(config.logging.file_prefix, "qdesk");
}

#[test]
fn test_zero_values_fall_back_to_defaults() {
    let file = parse(
        r#"
[channel]
reconnect_interval_ms = 0

[list]
per_page = 0
"#,
    );

    let config = Config::resolve(file, no_env);

    assert_eq!(config.channel.reconnect_interval_ms, 5000);
    assert_eq!(config.list.per_page, 10);
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel policy
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_channel_policy_mapping() {
    let fixed = ChannelSettings::default().policy();
    assert_eq!(fixed, ReconnectPolicy::Fixed(Duration::from_secs(5)));

    let file = parse(
        r#"
[channel]
reconnect_interval_ms = 1000
backoff = "exponential"
max_reconnect_interval_ms = 8000
"#,
    );
    let config = Config::resolve(file, no_env);
    assert_eq!(
        config.channel.policy(),
        ReconnectPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(8),
        }
    );
}

#[test]
fn test_unknown_backoff_falls_back_to_fixed() {
    let file = parse(
        r#"
[channel]
backoff = "random"
"#,
    );
    assert_eq!(Config::resolve(file, no_env).channel.backoff, Backoff::Fixed);
}

#[test]
fn test_log_rotation_parse() {
    assert_eq!(LogRotation::parse("never"), LogRotation::Never);
    assert_eq!(LogRotation::parse("weekly"), LogRotation::Daily);
}

// ─────────────────────────────────────────────────────────────────────────────
// File loading
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_file_is_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_path(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.list.per_page, 10);
}

#[test]
fn test_broken_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "api_base_url = http://unquoted").unwrap();

    let err = Config::from_path(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_write_to_creates_parents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    Config::default().write_to(&path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[channel]"));
}

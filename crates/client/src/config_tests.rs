// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::TempDir;
use yare::parameterized;

fn write(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn minimal_config_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, "url = \"ws://localhost:7891\"\naccount_id = \"a1\"\n");

    let config = Config::load(&path).unwrap();
    assert_eq!(config, Config::new("ws://localhost:7891", "a1"));
    assert_eq!(config.retry_policy(), RetryPolicy::default());
    assert_eq!(config.sync_options().page_size, None);
}

#[test]
fn full_config_is_read() {
    let temp = TempDir::new().unwrap();
    let path = write(
        &temp,
        r#"
url = "wss://mail.example.com/jmap"
account_id = "u42"
cache = "/tmp/mua.db"
page_size = 25
max_objects_in_get = 10
reconnect_max_retries = 3
reconnect_max_delay_secs = 5
initial_delay_ms = 50
"#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.cache_path().unwrap(), PathBuf::from("/tmp/mua.db"));
    assert_eq!(config.session().page_limit(config.page_size), Some(10));
    assert_eq!(
        config.retry_policy(),
        RetryPolicy {
            max_retries: 3,
            max_delay_secs: 5,
            initial_delay_ms: 50,
        }
    );
}

#[parameterized(
    http_url = { "url = \"http://localhost\"\naccount_id = \"a1\"\n", "must be ws://" },
    empty_account = { "url = \"ws://localhost\"\naccount_id = \"\"\n", "account_id" },
    zero_page = { "url = \"ws://localhost\"\naccount_id = \"a1\"\npage_size = 0\n", "page_size" },
)]
fn invalid_config_is_rejected(content: &str, expected: &str) {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, content);

    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains(expected), "{err}");
}

#[test]
fn missing_account_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, "url = \"ws://localhost\"\n");
    assert!(matches!(Config::load(&path), Err(Error::ConfigParse(_))));
}

#[test]
fn missing_file_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let result = Config::load(&temp.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");
    let mut config = Config::new("ws://localhost:7891", "a1");
    config.page_size = Some(50);

    config.save(&path).unwrap();
    assert_eq!(Config::load(&path).unwrap(), config);
}

#[test]
fn default_path_ends_in_app_dir() {
    if let Ok(path) = default_path() {
        assert!(path.ends_with("mua/config.toml"));
    }
}

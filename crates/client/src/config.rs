// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration is stored in `<config_dir>/mua/config.toml` and includes:
//! - `url`: WebSocket endpoint of the mail server
//! - `account_id`: the account to synchronize
//! - `cache`: optional path of the SQLite cache

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use mua_core::Session;

use crate::error::{Error, Result};
use crate::sync::SyncOptions;
use crate::transport::RetryPolicy;

const APP_DIR_NAME: &str = "mua";
const CONFIG_FILE_NAME: &str = "config.toml";
const CACHE_FILE_NAME: &str = "cache.db";

/// Client configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket URL, `ws://...` or `wss://...`.
    pub url: String,
    pub account_id: String,
    /// Path of the cache database (default: `<data_dir>/mua/cache.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<PathBuf>,
    /// Items requested per query page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    /// Largest number of objects the server returns from one Get.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_objects_in_get: Option<u64>,
    /// Maximum reconnection attempts before giving up (default: 10).
    #[serde(default = "default_reconnect_max_retries")]
    pub reconnect_max_retries: u32,
    /// Maximum delay between reconnection attempts in seconds (default: 30).
    #[serde(default = "default_reconnect_max_delay_secs")]
    pub reconnect_max_delay_secs: u64,
    /// Initial reconnection delay in milliseconds (default: 100).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_reconnect_max_retries() -> u32 {
    10
}

fn default_reconnect_max_delay_secs() -> u64 {
    30
}

fn default_initial_delay_ms() -> u64 {
    100
}

impl Config {
    /// A config for `url` and `account_id` with every other field defaulted.
    pub fn new(url: impl Into<String>, account_id: impl Into<String>) -> Self {
        Config {
            url: url.into(),
            account_id: account_id.into(),
            cache: None,
            page_size: None,
            max_objects_in_get: None,
            reconnect_max_retries: default_reconnect_max_retries(),
            reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }

    /// Loads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "invalid url '{}': must be ws:// or wss://",
                self.url
            )));
        }
        if self.account_id.is_empty() {
            return Err(Error::Config("account_id must not be empty".to_string()));
        }
        if self.page_size == Some(0) {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn session(&self) -> Session {
        Session::new(self.account_id.clone()).with_max_objects_in_get(self.max_objects_in_get)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.reconnect_max_retries,
            max_delay_secs: self.reconnect_max_delay_secs,
            initial_delay_ms: self.initial_delay_ms,
        }
    }

    /// The configured cache path, or the default one.
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache {
            Some(path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR_NAME).join(CACHE_FILE_NAME))
                .ok_or_else(|| Error::Config("no data directory for the cache".to_string())),
        }
    }
}

/// `<config_dir>/mua/config.toml`.
pub fn default_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| Error::Config("no configuration directory".to_string()))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

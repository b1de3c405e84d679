// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use mua_core::{CacheError, MethodError};

use crate::transport::TransportError;

/// All possible errors surfaced by the mua client.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] mua_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("max reconnection retries exceeded")]
    MaxRetriesExceeded,

    #[error("cache worker stopped")]
    CacheWorkerGone,

    #[error("not cached: {0}\n  hint: run 'mua refresh' or query the mailbox first")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CacheError> for Error {
    fn from(e: CacheError) -> Self {
        Error::Core(mua_core::Error::Cache(e))
    }
}

impl Error {
    /// The method error the server returned, if this is one.
    pub fn method_error(&self) -> Option<&MethodError> {
        match self {
            Error::Core(e) => e.method_error(),
            _ => None,
        }
    }

    /// The cache error behind this error, if any.
    pub fn cache_error(&self) -> Option<&CacheError> {
        match self {
            Error::Core(mua_core::Error::Cache(e)) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

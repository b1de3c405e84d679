// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mua - a mail client that keeps a local mirror of one account.
//!
//! # Main Components
//!
//! - [`Mua`] - the session: refresh, query, paging and mutations
//! - [`Transport`] - one request in, one response out; [`WebSocketTransport`]
//!   speaks the WebSocket framing
//! - [`Config`] - server, account and cache location
//! - [`Error`] - error types for all operations
//!
//! ```rust,ignore
//! let config = Config::load(&config::default_path()?)?;
//! let cache = SqliteCache::open(&config.cache_path()?)?;
//! let mua = Mua::connect(&config, cache).await?;
//!
//! let inbox = EmailQuery::unfiltered();
//! while mua.query(&inbox).await?.needs_more() {}
//! ```

mod cli;
mod commands;

pub mod config;
pub mod error;
pub mod mua;
pub mod sync;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod test_helpers;

pub use cli::{Cli, Command};
pub use commands::run;
pub use config::Config;
pub use error::{Error, Result};
pub use mua::Mua;
pub use sync::SyncOptions;
pub use transport::{RetryPolicy, Transport, TransportError, WebSocketTransport};

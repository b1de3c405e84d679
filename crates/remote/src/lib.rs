// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mua-remote: an in-memory mail server speaking the batched method-call
//! protocol over WebSocket.
//!
//! The server keeps one account with per-type change logs, so it can answer
//! Changes and QueryChanges calls, and supports one-shot fault injection for
//! exercising client recovery paths.

pub mod handler;
pub mod search;
pub mod server;
pub mod state;
pub mod store;

pub use handler::{execute, RequestFailure, SESSION_STATE};
pub use state::ServerState;
pub use store::{MailStore, NewEmail};

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Wraps the mail store for thread-safe access. Requests are executed one at
//! a time, so every request sees a consistent account.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use mua_core::response::{Request, Response};
use mua_core::Session;

use crate::handler::{self, RequestFailure};
use crate::store::MailStore;

/// Shared server state containing the account being served.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    /// The account (protected by mutex for writes).
    store: Mutex<MailStore>,
}

impl ServerState {
    pub fn new(store: MailStore) -> Self {
        ServerState {
            inner: Arc::new(ServerStateInner {
                store: Mutex::new(store),
            }),
        }
    }

    /// Executes a request against the account.
    pub async fn execute(&self, request: Request) -> Result<Response, RequestFailure> {
        let mut store = self.inner.store.lock().await;
        handler::execute(&mut store, request)
    }

    /// The session a client of this server should use.
    pub async fn session(&self) -> Session {
        self.inner.store.lock().await.session()
    }

    /// Locks the store for direct changes, e.g. mail arriving.
    pub async fn store(&self) -> MutexGuard<'_, MailStore> {
        self.inner.store.lock().await
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers: an in-process transport bound to a mock server.

#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use mua_core::{Request, Response, SqliteCache};
use mua_remote::{MailStore, ServerState};

use crate::mua::Mua;
use crate::sync::{Context, SyncOptions};
use crate::transport::{Transport, TransportError, TransportResult};
use crate::worker::CacheWorker;

/// Executes requests directly against a [`ServerState`].
pub struct LocalTransport {
    state: ServerState,
    connected: bool,
    /// Number of upcoming connects that fail.
    failing_connects: u32,
    connects: Arc<Mutex<u32>>,
    sent: Arc<Mutex<Vec<Request>>>,
}

impl LocalTransport {
    pub fn new(state: ServerState) -> Self {
        LocalTransport {
            state,
            connected: true,
            failing_connects: 0,
            connects: Arc::new(Mutex::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A transport that starts disconnected and refuses `n` connects.
    pub fn offline(state: ServerState, n: u32) -> Self {
        LocalTransport {
            connected: false,
            failing_connects: n,
            ..LocalTransport::new(state)
        }
    }

    pub fn connects(&self) -> u32 {
        *self.connects.lock().unwrap()
    }

    /// Handle to the requests sent so far.
    pub fn sent(&self) -> Arc<Mutex<Vec<Request>>> {
        Arc::clone(&self.sent)
    }
}

impl Transport for LocalTransport {
    fn connect(
        &mut self,
        _url: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            *self.connects.lock().unwrap() += 1;
            if self.failing_connects > 0 {
                self.failing_connects -= 1;
                return Err(TransportError::ConnectionFailed("refused".into()));
            }
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.connected = false;
            Ok(())
        })
    }

    fn execute(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Response>> + Send + '_>> {
        Box::pin(async move {
            if !self.connected {
                return Err(TransportError::ConnectionClosed);
            }
            self.sent.lock().unwrap().push(request.clone());
            self.state
                .execute(request)
                .await
                .map_err(|f| TransportError::RequestError {
                    kind: f.kind.to_string(),
                    status: f.status,
                    detail: Some(f.detail),
                })
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// A sync context over `state` and an in-memory cache.
pub async fn context(state: &ServerState, page_size: Option<u64>) -> Context<SqliteCache, LocalTransport> {
    Context {
        session: state.session().await,
        transport: LocalTransport::new(state.clone()),
        worker: CacheWorker::spawn(SqliteCache::open_in_memory().unwrap()).unwrap(),
        options: SyncOptions { page_size },
    }
}

/// A seeded server and a client over an in-memory cache.
pub async fn demo_client(page_size: Option<u64>) -> (ServerState, Mua<SqliteCache, LocalTransport>) {
    client_for(MailStore::demo("a1"), page_size).await
}

pub async fn client_for(
    store: MailStore,
    page_size: Option<u64>,
) -> (ServerState, Mua<SqliteCache, LocalTransport>) {
    let state = ServerState::new(store);
    let session = state.session().await;
    let transport = LocalTransport::new(state.clone());
    let cache = SqliteCache::open_in_memory().unwrap();
    let mua = Mua::new(session, transport, cache, SyncOptions { page_size }).unwrap();
    (state, mua)
}

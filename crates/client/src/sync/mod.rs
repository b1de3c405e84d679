// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization engines.
//!
//! - [`entity`]: Changes/Get cycles per entity type
//! - [`query`]: cached query results, refresh and paging
//!
//! Both engines build one batch per round trip, send it through the
//! [`Transport`], and apply the results through the [`CacheWorker`].

pub(crate) mod entity;
pub(crate) mod query;

use std::fmt::Display;

use tracing::{debug, warn};

use mua_core::{Batch, Cache, CacheResult, Responses, Session};

use crate::error::Result;
use crate::transport::Transport;
use crate::worker::CacheWorker;

/// Client-side tuning of the sync engines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Items requested per query page. `None` defers to the server maximum.
    pub page_size: Option<u64>,
}

/// Everything a sync step needs: who we are, how to reach the server and
/// where the mirror lives.
pub(crate) struct Context<C: Cache, T: Transport> {
    pub session: Session,
    pub transport: T,
    pub worker: CacheWorker<C>,
    pub options: SyncOptions,
}

/// How a cache write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Done,
    /// The cache had already moved; nothing was written.
    Conflict,
    /// The cached region is inconsistent and has to be rebuilt.
    Corruption,
}

impl<C: Cache, T: Transport> Context<C, T> {
    pub fn account_id(&self) -> &str {
        &self.session.account_id
    }

    /// The `limit` of a query page.
    pub fn page_limit(&self) -> Option<u64> {
        self.session.page_limit(self.options.page_size)
    }

    /// Sends `batch` in one round trip.
    pub async fn send(&self, batch: &Batch) -> Result<Responses> {
        let request = batch.to_request()?;
        debug!(
            "Sending {} method calls: {}",
            request.method_calls.len(),
            request
                .method_calls
                .iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let response = self.transport.execute(request).await?;
        Ok(Responses::new(batch, response)?)
    }

    /// Runs a cache operation on the worker.
    pub async fn cache<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut C) -> CacheResult<R> + Send + 'static,
        R: Send + 'static,
    {
        Ok(self.worker.run(f).await??)
    }

    /// Runs a cache write, turning conflicts and corruption into outcomes.
    pub async fn write<F>(&self, what: impl Display, f: F) -> Result<Applied>
    where
        F: FnOnce(&mut C) -> CacheResult<()> + Send + 'static,
    {
        match self.worker.run(f).await? {
            Ok(()) => Ok(Applied::Done),
            Err(e) if e.is_conflict() => {
                warn!("Ignoring {} conflict: {}", what, e);
                Ok(Applied::Conflict)
            }
            Err(e) if e.is_corruption() => {
                warn!("Cached {} is corrupt: {}", what, e);
                Ok(Applied::Corruption)
            }
            Err(e) => Err(e.into()),
        }
    }
}

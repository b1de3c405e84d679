// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The single writer in front of the cache.
//!
//! All cache reads and writes run on one dedicated thread, in the order
//! they were submitted. Async callers suspend on a oneshot reply.

use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use mua_core::Cache;

use crate::error::{Error, Result};

type Job<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Owns the cache and runs jobs against it on a background thread.
pub struct CacheWorker<C: Cache> {
    jobs: Option<mpsc::UnboundedSender<Job<C>>>,
    thread: Option<JoinHandle<()>>,
}

impl<C: Cache> CacheWorker<C> {
    /// Moves `cache` onto a new worker thread.
    pub fn spawn(mut cache: C) -> Result<Self> {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job<C>>();
        let thread = std::thread::Builder::new()
            .name("mua-cache".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job(&mut cache);
                }
                debug!("Cache worker stopped");
            })?;
        Ok(CacheWorker {
            jobs: Some(jobs),
            thread: Some(thread),
        })
    }

    /// Runs `f` on the worker and waits for its result.
    pub async fn run<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: Job<C> = Box::new(move |cache| {
            // The caller may have gone away; the work is done either way.
            let _ = reply.send(f(cache));
        });
        self.jobs
            .as_ref()
            .ok_or(Error::CacheWorkerGone)?
            .send(job)
            .map_err(|_| Error::CacheWorkerGone)?;
        rx.await.map_err(|_| Error::CacheWorkerGone)
    }
}

impl<C: Cache> Drop for CacheWorker<C> {
    fn drop(&mut self) {
        // Closing the channel ends the loop once queued jobs are done.
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

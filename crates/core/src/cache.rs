// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The contract between the sync engines and the local mirror.
//!
//! Every operation is atomic per entity type or query key. Two failure
//! signals matter to callers:
//!
//! - [`CacheError::Conflict`]: the cache moved under the caller (a concurrent
//!   sync already applied the same or a newer result). Safe to ignore.
//! - [`CacheError::Corruption`]: the cached region is inconsistent with the
//!   operation. The caller must invalidate it and rebuild.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{Email, Entity, Identity, Mailbox, Thread};
use crate::query::QueryKey;
use crate::state::{ObjectsState, StateToken};
use crate::update::{QueryItem, QueryResult, QueryUpdate, Update};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache conflict: {0}")]
    Conflict(String),

    #[error("cache corruption: {0}")]
    Corruption(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CacheError::Conflict(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, CacheError::Corruption(_))
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Last cached item of a query result and its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpTo {
    pub id: String,
    pub position: u64,
}

/// What the cache knows about one query, read in a single operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStateWrapper {
    pub query_state: Option<String>,
    pub can_calculate_changes: bool,
    /// `None` when nothing is cached for the query.
    pub up_to: Option<UpTo>,
    /// Current Mailbox/Email/Thread states.
    pub objects_state: ObjectsState,
}

impl QueryStateWrapper {
    /// True when the query has to be loaded from position 0.
    pub fn is_initial(&self) -> bool {
        self.query_state.is_none() || self.up_to.is_none()
    }
}

/// Objects referenced by a cached query that are not stored yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Missing {
    /// Threads whose thread object or any of whose emails is absent.
    pub thread_ids: Vec<String>,
    pub thread_state: Option<StateToken<Thread>>,
    pub email_state: Option<StateToken<Email>>,
}

impl Missing {
    pub fn is_empty(&self) -> bool {
        self.thread_ids.is_empty()
    }
}

/// The local mirror of server state.
pub trait Cache: Send + 'static {
    /// Mailbox, Email and Thread states, read together.
    fn objects_state(&self) -> CacheResult<ObjectsState>;

    fn state<T: Entity>(&self) -> CacheResult<Option<StateToken<T>>>;

    fn query_state(&self, key: &QueryKey) -> CacheResult<QueryStateWrapper>;

    /// Replaces every object of `T` and its state.
    fn set_all<T: Entity>(&mut self, state: &StateToken<T>, objects: &[T]) -> CacheResult<()>;

    /// Stores objects fetched outside a Changes cycle.
    ///
    /// Fails with a conflict if a different state is cached.
    fn add_entities<T: Entity>(&mut self, state: &StateToken<T>, objects: &[T]) -> CacheResult<()>;

    /// Applies `update`. Updated objects only overwrite the properties in
    /// `mask`; `None` replaces them whole. A masked update of an object that
    /// is not cached is skipped.
    ///
    /// Fails with a conflict if the cached state is not `update.old_state`.
    fn update_entities<T: Entity>(
        &mut self,
        update: &Update<T>,
        mask: Option<&[String]>,
    ) -> CacheResult<()>;

    /// Replaces the cached result of a query with a first page.
    fn set_query_result(&mut self, key: &QueryKey, result: &QueryResult) -> CacheResult<()>;

    /// Applies a query delta and records the object states it was computed
    /// against.
    fn update_query_results(
        &mut self,
        key: &QueryKey,
        update: &QueryUpdate,
        objects_state: &ObjectsState,
    ) -> CacheResult<()>;

    /// Appends a page that was requested after `after_id`.
    ///
    /// Fails with corruption if `after_id` is not the cached tail.
    fn add_query_result(
        &mut self,
        key: &QueryKey,
        after_id: &str,
        result: &QueryResult,
    ) -> CacheResult<()>;

    /// Drops every object of `T` and its state.
    fn invalidate<T: Entity>(&mut self) -> CacheResult<()>;

    fn invalidate_emails(&mut self) -> CacheResult<()> {
        self.invalidate::<Email>()
    }

    fn invalidate_threads(&mut self) -> CacheResult<()> {
        self.invalidate::<Thread>()
    }

    fn invalidate_mailboxes(&mut self) -> CacheResult<()> {
        self.invalidate::<Mailbox>()
    }

    fn invalidate_identities(&mut self) -> CacheResult<()> {
        self.invalidate::<Identity>()
    }

    fn invalidate_query_result(&mut self, key: &QueryKey) -> CacheResult<()>;

    fn missing(&self, key: &QueryKey) -> CacheResult<Missing>;

    fn get<T: Entity>(&self, id: &str) -> CacheResult<Option<T>>;

    fn get_all<T: Entity>(&self) -> CacheResult<Vec<T>>;

    /// The cached prefix of a query result, in order.
    fn query_items(&self, key: &QueryKey) -> CacheResult<Vec<QueryItem>>;
}

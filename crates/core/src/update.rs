// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation of Changes/QueryChanges responses with the Gets that
//! fetched the objects they name.
//!
//! Both reconcilers demand that the ids a Changes response reports match the
//! ids the dependent Get returned, as sets. A mismatch means the server broke
//! the protocol and is reported as [`Error::Reconciliation`].

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entity::{Email, Entity, EntityType};
use crate::error::{Error, Result};
use crate::response::{ChangesResponse, GetResponse, QueryChangesResponse, QueryResponse};
use crate::state::{ObjectsState, StateToken};
use crate::status::Status;

/// The delta between two states of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<T> {
    pub old_state: StateToken<T>,
    pub new_state: StateToken<T>,
    pub created: Vec<T>,
    pub updated: Vec<T>,
    pub destroyed: Vec<String>,
    pub has_more: bool,
    /// Properties the server reported as changed on the updated objects.
    pub updated_properties: Option<Vec<String>>,
}

impl<T: Entity> Update<T> {
    /// Reconciles a Changes response with the Gets for its created and
    /// updated ids.
    pub fn of(
        changes: ChangesResponse<T>,
        created: GetResponse<T>,
        updated: GetResponse<T>,
    ) -> Result<Self> {
        check_ids(T::TYPE, &changes.created, created.list.iter().map(Entity::id))?;
        check_ids(T::TYPE, &changes.updated, updated.list.iter().map(Entity::id))?;
        Ok(Update {
            old_state: changes.old_state,
            new_state: changes.new_state,
            created: created.list,
            updated: updated.list,
            destroyed: changes.destroyed,
            has_more: changes.has_more_changes,
            updated_properties: changes.updated_properties,
        })
    }

    /// True if applying this update changes the cache, state included.
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty()
            || !self.updated.is_empty()
            || !self.destroyed.is_empty()
            || self.old_state != self.new_state
    }

    pub fn status(&self) -> Status {
        if self.has_more {
            Status::HasMore
        } else if self.has_changes() {
            Status::Updated
        } else {
            Status::Unchanged
        }
    }
}

fn check_ids<'a>(
    entity: EntityType,
    expected: &[String],
    actual: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let actual: BTreeSet<&str> = actual.collect();
    let wanted: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    if actual != wanted || actual.len() != expected.len() {
        return Err(Error::Reconciliation {
            entity,
            expected: wanted.into_iter().map(str::to_string).collect(),
            actual: actual.into_iter().map(str::to_string).collect(),
        });
    }
    Ok(())
}

/// One entry of a cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryItem {
    pub email_id: String,
    pub thread_id: String,
}

impl QueryItem {
    pub fn new(email_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        QueryItem {
            email_id: email_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

/// A page of query results, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query_state: String,
    pub can_calculate_changes: bool,
    /// Index of the first item within the whole result.
    pub position: u64,
    pub items: Vec<QueryItem>,
    pub objects_state: ObjectsState,
}

impl QueryResult {
    /// Pairs the ids of a query page with the thread ids fetched for them.
    pub fn of(
        query: QueryResponse,
        emails: GetResponse<Email>,
        objects_state: ObjectsState,
    ) -> Result<Self> {
        let items = pair_thread_ids(&query.ids, emails)?;
        Ok(QueryResult {
            query_state: query.query_state,
            can_calculate_changes: query.can_calculate_changes,
            position: query.position,
            items,
            objects_state,
        })
    }
}

/// An item inserted into a query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedQueryItem {
    pub index: u64,
    pub item: QueryItem,
}

/// The delta between two states of one query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryUpdate {
    pub old_query_state: String,
    pub new_query_state: String,
    pub removed: Vec<String>,
    pub added: Vec<AddedQueryItem>,
}

impl QueryUpdate {
    /// Reconciles a QueryChanges response with the Get for its added ids.
    pub fn of(changes: QueryChangesResponse, emails: GetResponse<Email>) -> Result<Self> {
        let ids: Vec<String> = changes.added.iter().map(|a| a.id.clone()).collect();
        let items = pair_thread_ids(&ids, emails)?;
        let added = changes
            .added
            .iter()
            .zip(items)
            .map(|(a, item)| AddedQueryItem {
                index: a.index,
                item,
            })
            .collect();
        Ok(QueryUpdate {
            old_query_state: changes.old_query_state,
            new_query_state: changes.new_query_state,
            removed: changes.removed,
            added,
        })
    }

    pub fn has_changes(&self) -> bool {
        !self.removed.is_empty()
            || !self.added.is_empty()
            || self.old_query_state != self.new_query_state
    }

    pub fn status(&self) -> Status {
        if self.has_changes() {
            Status::Updated
        } else {
            Status::Unchanged
        }
    }

    /// Applies this update to a cached prefix of the result list.
    ///
    /// Removals go first, then insertions in ascending index order. Indices
    /// past the end of the prefix fall outside the cached range and are
    /// skipped. Ids stay unique.
    pub fn apply(&self, items: &mut Vec<QueryItem>) {
        let dropped: HashSet<&str> = self
            .removed
            .iter()
            .map(String::as_str)
            .chain(self.added.iter().map(|a| a.item.email_id.as_str()))
            .collect();
        items.retain(|item| !dropped.contains(item.email_id.as_str()));

        let mut added: Vec<&AddedQueryItem> = self.added.iter().collect();
        added.sort_by_key(|a| a.index);
        for a in added {
            let Ok(index) = usize::try_from(a.index) else {
                continue;
            };
            if index > items.len() {
                continue;
            }
            items.insert(index, a.item.clone());
        }
    }
}

/// Orders thread ids from a Get of `ids` by the order of `ids`.
fn pair_thread_ids(ids: &[String], emails: GetResponse<Email>) -> Result<Vec<QueryItem>> {
    check_ids(EntityType::Email, ids, emails.list.iter().map(|e| e.id.as_str()))?;
    let thread_ids: HashMap<String, String> = emails
        .list
        .into_iter()
        .map(|e| (e.id, e.thread_id))
        .collect();
    Ok(ids
        .iter()
        .filter_map(|id| {
            thread_ids
                .get(id)
                .map(|thread_id| QueryItem::new(id.clone(), thread_id.clone()))
        })
        .collect())
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;

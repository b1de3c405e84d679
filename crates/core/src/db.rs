// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed cache.
//!
//! Objects are stored as JSON documents keyed by entity type and id, next to
//! one state token per entity type. Query results keep their metadata in
//! `queries` and their ordered prefix in `query_items`. Every [`Cache`]
//! operation runs in its own transaction.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::Value;

use crate::cache::{Cache, CacheError, CacheResult, Missing, QueryStateWrapper, UpTo};
use crate::entity::{Email, Entity, EntityType, Thread};
use crate::query::QueryKey;
use crate::state::{ObjectsState, StateToken};
use crate::update::{QueryItem, QueryResult, QueryUpdate, Update};

/// SQL schema for the cache database.
pub const SCHEMA: &str = r#"
-- One state token per entity type
CREATE TABLE IF NOT EXISTS entity_state (
    entity TEXT PRIMARY KEY,
    state TEXT NOT NULL
);

-- Objects as JSON documents
CREATE TABLE IF NOT EXISTS objects (
    entity TEXT NOT NULL,
    id TEXT NOT NULL,
    json TEXT NOT NULL,
    PRIMARY KEY (entity, id)
);

-- Query result metadata, keyed by query fingerprint
CREATE TABLE IF NOT EXISTS queries (
    key TEXT PRIMARY KEY,
    query_state TEXT NOT NULL,
    can_calculate_changes INTEGER NOT NULL,
    objects_state TEXT NOT NULL
);

-- Cached prefix of each query result
CREATE TABLE IF NOT EXISTS query_items (
    key TEXT NOT NULL,
    position INTEGER NOT NULL,
    email_id TEXT NOT NULL,
    thread_id TEXT NOT NULL,
    PRIMARY KEY (key, position)
);

CREATE INDEX IF NOT EXISTS idx_query_items_email ON query_items(key, email_id);
"#;

/// Create the schema on a connection. Idempotent.
pub fn run_migrations(conn: &Connection) -> CacheResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// A [`Cache`] stored in one SQLite database.
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Open the cache at the given path, creating it if needed.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(SqliteCache { conn })
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(SqliteCache { conn })
    }
}

fn read_state(conn: &Connection, entity: EntityType) -> CacheResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT state FROM entity_state WHERE entity = ?1",
            params![entity.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_state(tx: &Transaction<'_>, entity: EntityType, state: &str) -> CacheResult<()> {
    tx.execute(
        "INSERT OR REPLACE INTO entity_state (entity, state) VALUES (?1, ?2)",
        params![entity.as_str(), state],
    )?;
    Ok(())
}

fn read_json(conn: &Connection, entity: EntityType, id: &str) -> CacheResult<Option<Value>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT json FROM objects WHERE entity = ?1 AND id = ?2",
            params![entity.as_str(), id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
}

fn write_json(tx: &Transaction<'_>, entity: EntityType, id: &str, json: &Value) -> CacheResult<()> {
    tx.execute(
        "INSERT OR REPLACE INTO objects (entity, id, json) VALUES (?1, ?2, ?3)",
        params![entity.as_str(), id, json.to_string()],
    )?;
    Ok(())
}

fn write_object<T: Entity>(tx: &Transaction<'_>, object: &T) -> CacheResult<()> {
    write_json(tx, T::TYPE, object.id(), &serde_json::to_value(object)?)
}

/// Copies the masked properties of `fresh` into `stored`.
fn merge_properties(stored: &mut Value, fresh: &Value, mask: &[String]) {
    let (Value::Object(stored), Value::Object(fresh)) = (stored, fresh) else {
        return;
    };
    for property in mask {
        if let Some(value) = fresh.get(property) {
            stored.insert(property.clone(), value.clone());
        }
    }
}

struct QueryRow {
    query_state: String,
    can_calculate_changes: bool,
}

fn read_query(conn: &Connection, key: &QueryKey) -> CacheResult<Option<QueryRow>> {
    Ok(conn
        .query_row(
            "SELECT query_state, can_calculate_changes FROM queries WHERE key = ?1",
            params![key.as_str()],
            |row| {
                Ok(QueryRow {
                    query_state: row.get(0)?,
                    can_calculate_changes: row.get(1)?,
                })
            },
        )
        .optional()?)
}

fn read_items(conn: &Connection, key: &QueryKey) -> CacheResult<Vec<QueryItem>> {
    let mut stmt = conn.prepare(
        "SELECT email_id, thread_id FROM query_items WHERE key = ?1 ORDER BY position",
    )?;
    let items = stmt
        .query_map(params![key.as_str()], |row| {
            Ok(QueryItem {
                email_id: row.get(0)?,
                thread_id: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

fn read_tail(conn: &Connection, key: &QueryKey) -> CacheResult<Option<UpTo>> {
    let tail: Option<(String, i64)> = conn
        .query_row(
            "SELECT email_id, position FROM query_items WHERE key = ?1
             ORDER BY position DESC LIMIT 1",
            params![key.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    tail.map(|(id, position)| {
        let position = u64::try_from(position)
            .map_err(|_| CacheError::Corruption(format!("negative position {position}")))?;
        Ok(UpTo { id, position })
    })
    .transpose()
}

fn write_items(
    tx: &Transaction<'_>,
    key: &QueryKey,
    first_position: u64,
    items: &[QueryItem],
) -> CacheResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO query_items (key, position, email_id, thread_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (offset, item) in items.iter().enumerate() {
        let position = i64::try_from(first_position + offset as u64)
            .map_err(|_| CacheError::Corruption("query position overflow".to_string()))?;
        stmt.execute(params![key.as_str(), position, item.email_id, item.thread_id])?;
    }
    Ok(())
}

fn delete_query(tx: &Transaction<'_>, key: &QueryKey) -> CacheResult<()> {
    tx.execute("DELETE FROM query_items WHERE key = ?1", params![key.as_str()])?;
    tx.execute("DELETE FROM queries WHERE key = ?1", params![key.as_str()])?;
    Ok(())
}

fn object_exists(conn: &Connection, entity: EntityType, id: &str) -> CacheResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM objects WHERE entity = ?1 AND id = ?2",
            params![entity.as_str(), id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

impl Cache for SqliteCache {
    fn objects_state(&self) -> CacheResult<ObjectsState> {
        let mut stmt = self.conn.prepare(
            "SELECT entity, state FROM entity_state
             WHERE entity IN ('Mailbox', 'Email', 'Thread')",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut objects_state = ObjectsState::default();
        for (entity, state) in rows {
            match entity.parse::<EntityType>() {
                Ok(EntityType::Mailbox) => objects_state.mailbox_state = Some(StateToken::new(state)),
                Ok(EntityType::Email) => objects_state.email_state = Some(StateToken::new(state)),
                Ok(EntityType::Thread) => objects_state.thread_state = Some(StateToken::new(state)),
                _ => return Err(CacheError::Corruption(format!("unexpected state row '{entity}'"))),
            }
        }
        Ok(objects_state)
    }

    fn state<T: Entity>(&self) -> CacheResult<Option<StateToken<T>>> {
        Ok(read_state(&self.conn, T::TYPE)?.map(StateToken::new))
    }

    fn query_state(&self, key: &QueryKey) -> CacheResult<QueryStateWrapper> {
        let objects_state = self.objects_state()?;
        let Some(row) = read_query(&self.conn, key)? else {
            return Ok(QueryStateWrapper {
                objects_state,
                ..QueryStateWrapper::default()
            });
        };
        Ok(QueryStateWrapper {
            query_state: Some(row.query_state),
            can_calculate_changes: row.can_calculate_changes,
            up_to: read_tail(&self.conn, key)?,
            objects_state,
        })
    }

    fn set_all<T: Entity>(&mut self, state: &StateToken<T>, objects: &[T]) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM objects WHERE entity = ?1", params![T::TYPE.as_str()])?;
        for object in objects {
            write_object(&tx, object)?;
        }
        write_state(&tx, T::TYPE, state.as_str())?;
        tx.commit()?;
        Ok(())
    }

    fn add_entities<T: Entity>(&mut self, state: &StateToken<T>, objects: &[T]) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        match read_state(&tx, T::TYPE)? {
            Some(cached) if cached != state.as_str() => {
                return Err(CacheError::Conflict(format!(
                    "{} objects fetched at state {state}, cache is at {cached}",
                    T::TYPE
                )));
            }
            Some(_) => {}
            None => write_state(&tx, T::TYPE, state.as_str())?,
        }
        for object in objects {
            write_object(&tx, object)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_entities<T: Entity>(
        &mut self,
        update: &Update<T>,
        mask: Option<&[String]>,
    ) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        let cached = read_state(&tx, T::TYPE)?;
        if cached.as_deref() != Some(update.old_state.as_str()) {
            return Err(CacheError::Conflict(format!(
                "{} update starts at {}, cache is at {}",
                T::TYPE,
                update.old_state,
                cached.as_deref().unwrap_or("<none>")
            )));
        }

        for object in &update.created {
            write_object(&tx, object)?;
        }
        for object in &update.updated {
            let Some(mask) = mask else {
                write_object(&tx, object)?;
                continue;
            };
            // Partially mirrored types get updates for objects never fetched.
            let Some(mut stored) = read_json(&tx, T::TYPE, object.id())? else {
                continue;
            };
            merge_properties(&mut stored, &serde_json::to_value(object)?, mask);
            write_json(&tx, T::TYPE, object.id(), &stored)?;
        }
        for id in &update.destroyed {
            tx.execute(
                "DELETE FROM objects WHERE entity = ?1 AND id = ?2",
                params![T::TYPE.as_str(), id],
            )?;
        }
        write_state(&tx, T::TYPE, update.new_state.as_str())?;
        tx.commit()?;
        Ok(())
    }

    fn set_query_result(&mut self, key: &QueryKey, result: &QueryResult) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        delete_query(&tx, key)?;
        tx.execute(
            "INSERT INTO queries (key, query_state, can_calculate_changes, objects_state)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key.as_str(),
                result.query_state,
                result.can_calculate_changes,
                serde_json::to_string(&result.objects_state)?,
            ],
        )?;
        write_items(&tx, key, result.position, &result.items)?;
        tx.commit()?;
        Ok(())
    }

    fn update_query_results(
        &mut self,
        key: &QueryKey,
        update: &QueryUpdate,
        objects_state: &ObjectsState,
    ) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        let Some(row) = read_query(&tx, key)? else {
            return Err(CacheError::Conflict(format!("query {key} is no longer cached")));
        };
        if row.query_state != update.old_query_state {
            return Err(CacheError::Conflict(format!(
                "query update starts at {}, cache is at {}",
                update.old_query_state, row.query_state
            )));
        }

        let mut items = read_items(&tx, key)?;
        update.apply(&mut items);
        tx.execute("DELETE FROM query_items WHERE key = ?1", params![key.as_str()])?;
        write_items(&tx, key, 0, &items)?;
        tx.execute(
            "UPDATE queries SET query_state = ?2, objects_state = ?3 WHERE key = ?1",
            params![
                key.as_str(),
                update.new_query_state,
                serde_json::to_string(objects_state)?,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn add_query_result(
        &mut self,
        key: &QueryKey,
        after_id: &str,
        result: &QueryResult,
    ) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        let Some(row) = read_query(&tx, key)? else {
            return Err(CacheError::Conflict(format!("query {key} is no longer cached")));
        };
        let Some(tail) = read_tail(&tx, key)? else {
            return Err(CacheError::Corruption(format!("query {key} has no cached items")));
        };
        if tail.id != after_id {
            return Err(CacheError::Corruption(format!(
                "page follows '{after_id}' but the cached tail is '{}'",
                tail.id
            )));
        }
        if row.query_state != result.query_state {
            return Err(CacheError::Conflict(format!(
                "page is at query state {}, cache is at {}",
                result.query_state, row.query_state
            )));
        }
        if result.position != tail.position + 1 {
            return Err(CacheError::Corruption(format!(
                "page starts at {} but the cached prefix ends at {}",
                result.position, tail.position
            )));
        }
        let cached: HashSet<String> = read_items(&tx, key)?
            .into_iter()
            .map(|item| item.email_id)
            .collect();
        if let Some(dup) = result.items.iter().find(|i| cached.contains(&i.email_id)) {
            return Err(CacheError::Corruption(format!(
                "page repeats cached id '{}'",
                dup.email_id
            )));
        }

        write_items(&tx, key, result.position, &result.items)?;
        tx.commit()?;
        Ok(())
    }

    fn invalidate<T: Entity>(&mut self) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM objects WHERE entity = ?1", params![T::TYPE.as_str()])?;
        tx.execute("DELETE FROM entity_state WHERE entity = ?1", params![T::TYPE.as_str()])?;
        tx.commit()?;
        Ok(())
    }

    fn invalidate_query_result(&mut self, key: &QueryKey) -> CacheResult<()> {
        let tx = self.conn.transaction()?;
        delete_query(&tx, key)?;
        tx.commit()?;
        Ok(())
    }

    fn missing(&self, key: &QueryKey) -> CacheResult<Missing> {
        let mut seen = HashSet::new();
        let mut thread_ids = Vec::new();
        for item in read_items(&self.conn, key)? {
            if !seen.insert(item.thread_id.clone()) {
                continue;
            }
            let complete = match self.get::<Thread>(&item.thread_id)? {
                Some(thread) => thread
                    .email_ids
                    .iter()
                    .map(|id| object_exists(&self.conn, EntityType::Email, id))
                    .collect::<CacheResult<Vec<bool>>>()?
                    .into_iter()
                    .all(|exists| exists),
                None => false,
            };
            if !complete {
                thread_ids.push(item.thread_id);
            }
        }
        Ok(Missing {
            thread_ids,
            thread_state: self.state::<Thread>()?,
            email_state: self.state::<Email>()?,
        })
    }

    fn get<T: Entity>(&self, id: &str) -> CacheResult<Option<T>> {
        match read_json(&self.conn, T::TYPE, id)? {
            Some(json) => Ok(Some(serde_json::from_value(json)?)),
            None => Ok(None),
        }
    }

    fn get_all<T: Entity>(&self) -> CacheResult<Vec<T>> {
        let mut stmt = self
            .conn
            .prepare("SELECT json FROM objects WHERE entity = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![T::TYPE.as_str()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str::<T>(json).map_err(CacheError::from))
            .collect()
    }

    fn query_items(&self, key: &QueryKey) -> CacheResult<Vec<QueryItem>> {
        read_items(&self.conn, key)
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;

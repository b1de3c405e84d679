// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque server state tokens.
//!
//! A [`StateToken`] is never parsed or ordered: two tokens are the same
//! version of a collection iff their strings are equal. The type parameter
//! keeps an Email state from being handed to a Mailbox call.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entity::{Email, Mailbox, Thread};

/// A server-issued state string tagged with the entity type it describes.
pub struct StateToken<T> {
    value: String,
    _type: PhantomData<fn() -> T>,
}

impl<T> StateToken<T> {
    pub fn new(value: impl Into<String>) -> Self {
        StateToken {
            value: value.into(),
            _type: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl<T> Clone for StateToken<T> {
    fn clone(&self) -> Self {
        StateToken::new(self.value.clone())
    }
}

impl<T> PartialEq for StateToken<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for StateToken<T> {}

impl<T> Hash for StateToken<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> fmt::Debug for StateToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateToken({:?})", self.value)
    }
}

impl<T> fmt::Display for StateToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for StateToken<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T> Deserialize<'de> for StateToken<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(StateToken::new)
    }
}

/// Snapshot of the cached Mailbox/Email/Thread states, read in one cache
/// operation before a sync round.
///
/// Serves as the `ifInState` baseline for mutations and is stored next to
/// query results to record which object versions they were computed against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectsState {
    pub mailbox_state: Option<StateToken<Mailbox>>,
    pub email_state: Option<StateToken<Email>>,
    pub thread_state: Option<StateToken<Thread>>,
}

impl ObjectsState {
    /// True when none of the three collections has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.mailbox_state.is_none() && self.email_state.is_none() && self.thread_state.is_none()
    }
}

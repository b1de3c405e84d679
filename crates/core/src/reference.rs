// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Back-references between invocations of one batch.
//!
//! A [`ResultReference`] stands in for a concrete argument value and names a
//! path inside the result of an earlier invocation. On the wire it replaces
//! the argument under a `#`-prefixed key:
//!
//! ```text
//! "#ids": { "resultOf": "0", "name": "Email/changes", "path": "/created" }
//! ```
//!
//! Paths are JSON pointers with one extension: a `*` token applied to an
//! array maps the rest of the pointer over every item and flattens nested
//! arrays into the output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::method::MethodName;

/// Paths commonly referenced by the sync engines.
pub mod path {
    pub const IDS: &str = "/ids";
    pub const CREATED: &str = "/created";
    pub const UPDATED: &str = "/updated";
    pub const UPDATED_PROPERTIES: &str = "/updatedProperties";
    pub const ADDED_IDS: &str = "/added/*/id";
    pub const LIST_IDS: &str = "/list/*/id";
    pub const LIST_THREAD_IDS: &str = "/list/*/threadId";
    pub const LIST_EMAIL_IDS: &str = "/list/*/emailIds";
}

/// A pointer into the result of an earlier invocation of the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReference {
    /// Request-local id of the source invocation.
    pub result_of: String,
    /// Method name the source invocation must have responded with.
    pub name: MethodName,
    /// Extended JSON pointer evaluated against the source result.
    pub path: String,
}

impl ResultReference {
    pub fn new(result_of: impl Into<String>, name: MethodName, path: impl Into<String>) -> Self {
        ResultReference {
            result_of: result_of.into(),
            name,
            path: path.into(),
        }
    }

    /// Evaluates this reference against the arguments of the source result.
    pub fn resolve(&self, result: &Value) -> Result<Value> {
        evaluate(result, &self.path)
    }
}

/// An argument that is either a concrete value or deferred to the result of
/// an earlier invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<T> {
    Literal(T),
    Deferred(ResultReference),
}

impl<T> Arg<T> {
    pub fn reference(&self) -> Option<&ResultReference> {
        match self {
            Arg::Literal(_) => None,
            Arg::Deferred(r) => Some(r),
        }
    }

    pub fn literal(&self) -> Option<&T> {
        match self {
            Arg::Literal(v) => Some(v),
            Arg::Deferred(_) => None,
        }
    }

    /// Stores `new` in `slot`, refusing to mix a concrete value with a
    /// reference on the same field.
    pub fn assign(slot: &mut Option<Arg<T>>, new: Arg<T>, field: &'static str) -> Result<()> {
        let conflict = matches!(
            (&*slot, &new),
            (Some(Arg::Literal(_)), Arg::Deferred(_)) | (Some(Arg::Deferred(_)), Arg::Literal(_))
        );
        if conflict {
            return Err(Error::ConflictingArgument(field));
        }
        *slot = Some(new);
        Ok(())
    }
}

impl<T> From<ResultReference> for Arg<T> {
    fn from(r: ResultReference) -> Self {
        Arg::Deferred(r)
    }
}

/// Evaluates an extended JSON pointer against `value`.
pub fn evaluate(value: &Value, pointer: &str) -> Result<Value> {
    if pointer.is_empty() {
        return Ok(value.clone());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(Error::InvalidPointer(pointer.to_string()));
    };
    let tokens: Vec<String> = rest.split('/').map(unescape).collect();
    evaluate_tokens(value, &tokens).ok_or_else(|| Error::InvalidPointer(pointer.to_string()))
}

fn evaluate_tokens(value: &Value, tokens: &[String]) -> Option<Value> {
    let Some((head, rest)) = tokens.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Array(items) if head == "*" => {
            let mut out = Vec::new();
            for item in items {
                match evaluate_tokens(item, rest)? {
                    Value::Array(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Some(Value::Array(out))
        }
        Value::Array(items) => {
            let index: usize = head.parse().ok()?;
            evaluate_tokens(items.get(index)?, rest)
        }
        Value::Object(map) => evaluate_tokens(map.get(head.as_str())?, rest),
        _ => None,
    }
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
#[path = "reference_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Email queries and their cache fingerprints.
//!
//! A query result is cached under a [`QueryKey`]: the SHA-256 of the
//! query's canonical string. The canonical string orders condition
//! properties lexically and sorts the operands of every operator, so two
//! queries that differ only in the order their sub-filters were added share
//! one cache entry, in every process.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Boolean operator combining filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
        }
    }
}

/// `Email/query` filter condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_mailbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_mailbox_other_than: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_in_thread_have_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub some_in_thread_have_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none_in_thread_have_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl FilterCondition {
    pub fn in_mailbox(id: impl Into<String>) -> Self {
        FilterCondition {
            in_mailbox: Some(id.into()),
            ..FilterCondition::default()
        }
    }

    pub fn has_keyword(keyword: impl Into<String>) -> Self {
        FilterCondition {
            has_keyword: Some(keyword.into()),
            ..FilterCondition::default()
        }
    }

    pub fn not_keyword(keyword: impl Into<String>) -> Self {
        FilterCondition {
            not_keyword: Some(keyword.into()),
            ..FilterCondition::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        FilterCondition {
            text: Some(text.into()),
            ..FilterCondition::default()
        }
    }
}

/// A filter tree: either a condition or an operator over sub-filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Operator {
        operator: Operator,
        conditions: Vec<Filter>,
    },
    Condition(FilterCondition),
}

impl Filter {
    pub fn and(conditions: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Operator {
            operator: Operator::And,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn or(conditions: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Operator {
            operator: Operator::Or,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn not(conditions: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Operator {
            operator: Operator::Not,
            conditions: conditions.into_iter().collect(),
        }
    }

    /// Canonical text form; operands of every operator are sorted.
    pub fn canonical(&self) -> Result<String> {
        match self {
            Filter::Condition(condition) => {
                let mut value = serde_json::to_value(condition)?;
                if let Some(Value::Array(ids)) = value.get_mut("inMailboxOtherThan") {
                    ids.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
                }
                Ok(canonical_json(&value))
            }
            Filter::Operator {
                operator,
                conditions,
            } => {
                let mut parts = conditions
                    .iter()
                    .map(Filter::canonical)
                    .collect::<Result<Vec<_>>>()?;
                parts.sort();
                Ok(format!("{}({})", operator.as_str(), parts.join(",")))
            }
        }
    }
}

impl From<FilterCondition> for Filter {
    fn from(condition: FilterCondition) -> Self {
        Filter::Condition(condition)
    }
}

/// Serializes `value` with object keys in lexical order.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// Sort criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparator {
    pub property: String,
    #[serde(default = "default_ascending")]
    pub is_ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl Comparator {
    pub fn ascending(property: impl Into<String>) -> Self {
        Comparator {
            property: property.into(),
            is_ascending: true,
        }
    }

    pub fn descending(property: impl Into<String>) -> Self {
        Comparator {
            property: property.into(),
            is_ascending: false,
        }
    }
}

/// The filter, sort and thread collapsing of one `Email/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailQuery {
    pub filter: Option<Filter>,
    pub sort: Vec<Comparator>,
    pub collapse_threads: bool,
}

impl Default for EmailQuery {
    fn default() -> Self {
        EmailQuery {
            filter: None,
            sort: vec![Comparator::descending("receivedAt")],
            collapse_threads: true,
        }
    }
}

impl EmailQuery {
    /// Every email, newest first, one per thread.
    pub fn unfiltered() -> Self {
        EmailQuery::default()
    }

    pub fn in_mailbox(mailbox_id: impl Into<String>) -> Self {
        EmailQuery::default().filter(FilterCondition::in_mailbox(mailbox_id))
    }

    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, sort: Vec<Comparator>) -> Self {
        self.sort = sort;
        self
    }

    pub fn collapse_threads(mut self, collapse: bool) -> Self {
        self.collapse_threads = collapse;
        self
    }

    /// Canonical text form of the whole query.
    ///
    /// Sort order is significant and kept as given.
    pub fn canonical(&self) -> Result<String> {
        let filter = match &self.filter {
            Some(filter) => filter.canonical()?,
            None => String::new(),
        };
        let sort: Vec<String> = self
            .sort
            .iter()
            .map(|c| format!("{}:{}", c.property, if c.is_ascending { "asc" } else { "desc" }))
            .collect();
        Ok(format!(
            "filter={filter};sort={};collapseThreads={}",
            sort.join(","),
            self.collapse_threads
        ))
    }

    /// The cache key of this query.
    pub fn fingerprint(&self) -> Result<QueryKey> {
        let digest = Sha256::digest(self.canonical()?.as_bytes());
        Ok(QueryKey(hex::encode(digest)))
    }
}

/// Cache key of a query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for QueryKey {
    fn from(s: String) -> Self {
        QueryKey(s)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;

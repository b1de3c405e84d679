// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Outcome of a sync step.
///
/// Variants are ordered so that merging a set of outcomes is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The cache already matched the server.
    Unchanged,
    /// The cache was brought up to date.
    Updated,
    /// More changes are pending; sync again.
    HasMore,
}

impl Status {
    /// The strongest of `statuses`, or [`Status::Unchanged`] when empty.
    pub fn merge(statuses: impl IntoIterator<Item = Status>) -> Status {
        statuses.into_iter().max().unwrap_or(Status::Unchanged)
    }

    pub fn needs_more(&self) -> bool {
        *self == Status::HasMore
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Unchanged => "unchanged",
            Status::Updated => "updated",
            Status::HasMore => "has_more",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

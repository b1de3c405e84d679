// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! What the client knows about the account it talks to.

use serde::{Deserialize, Serialize};

/// Account and server limits used to shape requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account_id: String,
    /// Largest number of objects the server returns from one Get.
    #[serde(default)]
    pub max_objects_in_get: Option<u64>,
}

impl Session {
    pub fn new(account_id: impl Into<String>) -> Self {
        Session {
            account_id: account_id.into(),
            max_objects_in_get: None,
        }
    }

    pub fn with_max_objects_in_get(mut self, max: Option<u64>) -> Self {
        self.max_objects_in_get = max;
        self
    }

    /// The `limit` of a query page.
    ///
    /// A configured page size is capped at the server maximum; without one
    /// the server maximum is used. With neither, `None` lets the server pick.
    pub fn page_limit(&self, page_size: Option<u64>) -> Option<u64> {
        match (page_size, self.max_objects_in_get) {
            (Some(size), Some(max)) => Some(size.min(max)),
            (Some(size), None) => Some(size),
            (None, max) => max,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

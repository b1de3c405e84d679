// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire shapes of requests and responses, typed method results, and the
//! matching of responses back to the invocations of a batch.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, MethodFailure, Result};
use crate::method::MethodName;
use crate::request::{Batch, Call};
use crate::state::StateToken;

/// Name used by the server in place of a method name for method errors.
pub const ERROR_NAME: &str = "error";

/// `[name, arguments, invocationId]` as sent and received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireInvocation(pub String, pub Value, pub String);

impl WireInvocation {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn arguments(&self) -> &Value {
        &self.1
    }

    pub fn id(&self) -> &str {
        &self.2
    }
}

/// Request object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub using: Vec<String>,
    pub method_calls: Vec<WireInvocation>,
}

/// Response object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub method_responses: Vec<WireInvocation>,
    #[serde(default)]
    pub created_ids: Option<Map<String, Value>>,
    pub session_state: String,
}

/// Declared method error types.
///
/// An error payload with any other `type` is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MethodErrorType {
    ServerUnavailable,
    ServerFail,
    ServerPartialFail,
    UnknownMethod,
    InvalidArguments,
    InvalidResultReference,
    Forbidden,
    AccountNotFound,
    AccountNotSupportedByMethod,
    AccountReadOnly,
    RequestTooLarge,
    CannotCalculateChanges,
    StateMismatch,
    AnchorNotFound,
    UnsupportedFilter,
    UnsupportedSort,
    TooManyChanges,
}

impl fmt::Display for MethodErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(s)) => f.write_str(&s),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// Payload of an `error` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodError {
    #[serde(rename = "type")]
    pub kind: MethodErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MethodError {
    pub fn new(kind: MethodErrorType) -> Self {
        MethodError {
            kind,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "{}: {d}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Per-object failure inside a Set response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetError {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponse<T> {
    pub account_id: String,
    pub state: StateToken<T>,
    pub list: Vec<T>,
    #[serde(default)]
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse<T> {
    pub account_id: String,
    pub old_state: StateToken<T>,
    pub new_state: StateToken<T>,
    pub has_more_changes: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub destroyed: Vec<String>,
    /// Mailbox/changes only: the properties that changed, when the server
    /// can tell that only counters moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_properties: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub account_id: String,
    pub query_state: String,
    pub can_calculate_changes: bool,
    pub position: u64,
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// An id inserted into a query result at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedItem {
    pub id: String,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryChangesResponse {
    pub account_id: String,
    pub old_query_state: String,
    pub new_query_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub removed: Vec<String>,
    pub added: Vec<AddedItem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResponse {
    pub account_id: String,
    #[serde(default)]
    pub old_state: Option<String>,
    pub new_state: String,
    #[serde(default)]
    pub created: Option<Map<String, Value>>,
    #[serde(default)]
    pub updated: Option<Map<String, Value>>,
    #[serde(default)]
    pub destroyed: Option<Vec<String>>,
    #[serde(default)]
    pub not_created: Option<Map<String, Value>>,
    #[serde(default)]
    pub not_updated: Option<Map<String, Value>>,
    #[serde(default)]
    pub not_destroyed: Option<Map<String, Value>>,
}

impl SetResponse {
    /// Every rejected create, update and destroy, keyed by creation or object id.
    pub fn failures(&self) -> Result<Vec<(String, SetError)>> {
        let mut errors = Vec::new();
        for map in [&self.not_created, &self.not_updated, &self.not_destroyed]
            .into_iter()
            .flatten()
        {
            for (id, value) in map {
                errors.push((id.clone(), serde_json::from_value(value.clone())?));
            }
        }
        Ok(errors)
    }

    /// Server id assigned to `creation_id`.
    pub fn created_id(&self, creation_id: &str) -> Option<&str> {
        self.created
            .as_ref()?
            .get(creation_id)?
            .get("id")?
            .as_str()
    }
}

/// The responses of one batch, matched to its invocations.
#[derive(Debug, Clone)]
pub struct Responses {
    entries: Vec<WireInvocation>,
    session_state: String,
}

impl Responses {
    /// Matches `response` against the invocations of `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a response carries an id the batch did
    /// not declare or an invocation received no response at all.
    pub fn new(batch: &Batch, response: Response) -> Result<Self> {
        for entry in &response.method_responses {
            if !batch.invocations().iter().any(|i| i.id == entry.id()) {
                return Err(Error::Protocol(format!(
                    "response '{}' for unknown invocation '{}'",
                    entry.name(),
                    entry.id()
                )));
            }
        }
        for invocation in batch.invocations() {
            if !response
                .method_responses
                .iter()
                .any(|e| e.id() == invocation.id)
            {
                return Err(Error::Protocol(format!(
                    "no response for invocation '{}' ({})",
                    invocation.id,
                    invocation.call.name()
                )));
            }
        }
        Ok(Responses {
            entries: response.method_responses,
            session_state: response.session_state,
        })
    }

    pub fn session_state(&self) -> &str {
        &self.session_state
    }

    /// The result of `call`: the typed payload or the method error the
    /// server returned for it.
    pub fn result<T: DeserializeOwned>(&self, call: &Call) -> Result<std::result::Result<T, MethodError>> {
        let name = call.name().to_string();
        let entry = self
            .entries
            .iter()
            .find(|e| e.id() == call.id() && (e.name() == name || e.name() == ERROR_NAME))
            .ok_or_else(|| {
                Error::Protocol(format!("no {name} response for invocation '{}'", call.id()))
            })?;
        if entry.name() == ERROR_NAME {
            let error: MethodError = serde_json::from_value(entry.arguments().clone())
                .map_err(|e| Error::Protocol(format!("malformed error response: {e}")))?;
            return Ok(Err(error));
        }
        let payload = serde_json::from_value(entry.arguments().clone())
            .map_err(|e| Error::Protocol(format!("malformed {name} response: {e}")))?;
        Ok(Ok(payload))
    }

    /// The typed payload of `call`, turning a method error into [`Error::Method`].
    pub fn get<T: DeserializeOwned>(&self, call: &Call) -> Result<T> {
        match self.result(call)? {
            Ok(payload) => Ok(payload),
            Err(error) => Err(self.failure(call, error)),
        }
    }

    /// An implicit response the server attached to `call`'s invocation id.
    pub fn implicit<T: DeserializeOwned>(&self, call: &Call, name: MethodName) -> Result<Option<T>> {
        let name = name.to_string();
        match self
            .entries
            .iter()
            .find(|e| e.id() == call.id() && e.name() == name)
        {
            Some(entry) => serde_json::from_value(entry.arguments().clone())
                .map(Some)
                .map_err(|e| Error::Protocol(format!("malformed {name} response: {e}"))),
            None => Ok(None),
        }
    }

    /// Wraps a method error of `call` with the rest of the batch's results.
    pub fn failure(&self, call: &Call, error: MethodError) -> Error {
        let completed = self
            .entries
            .iter()
            .filter(|e| e.id() != call.id() && e.name() != ERROR_NAME)
            .cloned()
            .collect();
        Error::Method(Box::new(MethodFailure {
            call: call.name().to_string(),
            invocation_id: call.id().to_string(),
            error,
            completed,
        }))
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;

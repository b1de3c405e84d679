// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for mua-core operations.

use thiserror::Error;

use crate::cache::CacheError;
use crate::entity::EntityType;
use crate::response::{MethodError, SetError, WireInvocation};

/// All possible errors that can occur in mua-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The server rejected one invocation of a batch.
    #[error("{0}")]
    Method(Box<MethodFailure>),

    /// A Changes response and its dependent Gets disagree on ids.
    #[error("{entity} changes do not match fetched objects: expected {expected:?}, got {actual:?}")]
    Reconciliation {
        entity: EntityType,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("argument '{0}' cannot hold both a value and a result reference")]
    ConflictingArgument(&'static str),

    #[error("result reference to '{0}' must point to an earlier invocation")]
    ForwardReference(String),

    #[error("creation id '#{0}' is not declared by an earlier set call")]
    UnknownCreationId(String),

    #[error("invalid result reference path: {0}")]
    InvalidPointer(String),

    /// A Set call was accepted but some of its entries were not.
    #[error("{call} rejected {} entries: {}", .errors.len(), describe_set_errors(.errors))]
    SetFailed {
        call: String,
        errors: Vec<(String, SetError)>,
    },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A method-level error together with the context it occurred in.
#[derive(Debug)]
pub struct MethodFailure {
    /// Method name of the offending call, e.g. `Email/set`.
    pub call: String,
    /// Request-local id of the offending call.
    pub invocation_id: String,
    pub error: MethodError,
    /// Results of the other invocations of the same batch.
    pub completed: Vec<WireInvocation>,
}

impl std::fmt::Display for MethodFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) failed: {}", self.call, self.invocation_id, self.error)
    }
}

fn describe_set_errors(errors: &[(String, SetError)]) -> String {
    errors
        .iter()
        .map(|(id, e)| format!("{id}: {}", e.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// The method error carried by this error, if any.
    pub fn method_error(&self) -> Option<&MethodError> {
        match self {
            Error::Method(failure) => Some(&failure.error),
            _ => None,
        }
    }
}

/// A specialized Result type for mua-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

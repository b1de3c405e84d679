// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Batch Builder.
//!
//! A batch is one outbound request: an ordered list of invocations the
//! server evaluates in declaration order within a single round trip.
//! [`BatchBuilder::call`] appends an invocation and hands back a [`Call`]
//! that later invocations can reference.

use std::collections::{BTreeSet, HashSet};

use crate::error::{Error, Result};
use crate::method::{MethodCall, MethodName, Namespace};
use crate::reference::ResultReference;
use crate::response::{Request, WireInvocation};

/// A method call paired with its request-local id.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub call: MethodCall,
    pub id: String,
}

/// Handle to an invocation appended to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    id: String,
    name: MethodName,
}

impl Call {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> MethodName {
        self.name
    }

    /// A reference to `path` inside this invocation's future result.
    pub fn create_reference(&self, path: impl Into<String>) -> ResultReference {
        ResultReference::new(self.id.clone(), self.name, path)
    }
}

/// Accumulates invocations for one request.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    invocations: Vec<Invocation>,
    creation_ids: HashSet<String>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        BatchBuilder::default()
    }

    /// Appends `call` and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForwardReference`] if a result reference of `call`
    /// does not point at an invocation already in the batch (or names a
    /// different method than that invocation), and
    /// [`Error::UnknownCreationId`] if it uses a creation id no earlier Set
    /// call declared.
    pub fn call(&mut self, call: MethodCall) -> Result<Call> {
        for reference in call.references() {
            let declared = self
                .invocations
                .iter()
                .any(|i| i.id == reference.result_of && i.call.name() == reference.name);
            if !declared {
                return Err(Error::ForwardReference(format!(
                    "{} ({})",
                    reference.result_of, reference.name
                )));
            }
        }
        for creation_id in call.creation_references() {
            if !self.creation_ids.contains(creation_id) {
                return Err(Error::UnknownCreationId(creation_id.to_string()));
            }
        }

        let id = self.invocations.len().to_string();
        let handle = Call {
            id: id.clone(),
            name: call.name(),
        };
        self.creation_ids
            .extend(call.creation_ids().into_iter().map(str::to_string));
        self.invocations.push(Invocation { call, id });
        Ok(handle)
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    /// Freezes the invocation list and the namespaces it requires.
    pub fn build(self) -> Batch {
        let mut using: BTreeSet<Namespace> = BTreeSet::new();
        using.insert(Namespace::Core);
        for invocation in &self.invocations {
            using.extend(invocation.call.namespaces());
        }
        Batch {
            invocations: self.invocations,
            using,
        }
    }
}

/// A frozen batch, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    invocations: Vec<Invocation>,
    using: BTreeSet<Namespace>,
}

impl Batch {
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn using(&self) -> &BTreeSet<Namespace> {
        &self.using
    }

    /// Encodes the batch as a request object.
    pub fn to_request(&self) -> Result<Request> {
        let method_calls = self
            .invocations
            .iter()
            .map(|i| {
                Ok(WireInvocation(
                    i.call.name().to_string(),
                    serde_json::Value::Object(i.call.arguments()?),
                    i.id.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Request {
            using: self.using.iter().map(|n| n.uri().to_string()).collect(),
            method_calls,
        })
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;

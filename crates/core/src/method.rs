// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Method calls understood by the client.
//!
//! The set of methods is closed: every call is one of five verbs applied to
//! one of the [`EntityType`]s. Names, capabilities and argument encoding are
//! resolved through exhaustive matches instead of a runtime registry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::entity::EntityType;
use crate::error::Result;
use crate::query::{Comparator, EmailQuery, Filter};
use crate::reference::{Arg, ResultReference};

/// A capability a request declares in `using`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Core,
    Mail,
    Submission,
}

impl Namespace {
    pub fn uri(&self) -> &'static str {
        match self {
            Namespace::Core => "urn:ietf:params:jmap:core",
            Namespace::Mail => "urn:ietf:params:jmap:mail",
            Namespace::Submission => "urn:ietf:params:jmap:submission",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "urn:ietf:params:jmap:core" => Some(Namespace::Core),
            "urn:ietf:params:jmap:mail" => Some(Namespace::Mail),
            "urn:ietf:params:jmap:submission" => Some(Namespace::Submission),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Changes,
    Query,
    QueryChanges,
    Set,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Changes => "changes",
            Verb::Query => "query",
            Verb::QueryChanges => "queryChanges",
            Verb::Set => "set",
        }
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "get" => Ok(Verb::Get),
            "changes" => Ok(Verb::Changes),
            "query" => Ok(Verb::Query),
            "queryChanges" => Ok(Verb::QueryChanges),
            "set" => Ok(Verb::Set),
            other => Err(format!("unknown method verb '{other}'")),
        }
    }
}

/// A method name such as `Email/get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodName {
    pub entity: EntityType,
    pub verb: Verb,
}

impl MethodName {
    pub const fn new(entity: EntityType, verb: Verb) -> Self {
        MethodName { entity, verb }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity.as_str(), self.verb.as_str())
    }
}

impl FromStr for MethodName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (entity, verb) = s
            .split_once('/')
            .ok_or_else(|| format!("malformed method name '{s}'"))?;
        Ok(MethodName {
            entity: entity.parse()?,
            verb: verb.parse()?,
        })
    }
}

impl Serialize for MethodName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MethodName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `Foo/get`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetCall {
    pub entity: EntityType,
    pub account_id: String,
    /// `None` fetches every object of the type.
    pub ids: Option<Arg<Vec<String>>>,
    /// `None` fetches every property.
    pub properties: Option<Arg<Vec<String>>>,
}

impl GetCall {
    pub fn new(entity: EntityType, account_id: impl Into<String>) -> Self {
        GetCall {
            entity,
            account_id: account_id.into(),
            ids: None,
            properties: None,
        }
    }

    /// Sets an explicit id list.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConflictingArgument`] if `ids` already holds a reference.
    pub fn ids(mut self, ids: Vec<String>) -> Result<Self> {
        Arg::assign(&mut self.ids, Arg::Literal(ids), "ids")?;
        Ok(self)
    }

    /// Defers `ids` to the result of an earlier invocation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConflictingArgument`] if `ids` already holds a list.
    pub fn ids_ref(mut self, reference: ResultReference) -> Result<Self> {
        Arg::assign(&mut self.ids, Arg::Deferred(reference), "ids")?;
        Ok(self)
    }

    pub fn properties<I, S>(mut self, properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let properties = properties.into_iter().map(Into::into).collect();
        Arg::assign(&mut self.properties, Arg::Literal(properties), "properties")?;
        Ok(self)
    }

    pub fn properties_ref(mut self, reference: ResultReference) -> Result<Self> {
        Arg::assign(&mut self.properties, Arg::Deferred(reference), "properties")?;
        Ok(self)
    }
}

/// `Foo/changes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesCall {
    pub entity: EntityType,
    pub account_id: String,
    pub since_state: String,
    pub max_changes: Option<u64>,
}

impl ChangesCall {
    pub fn new(
        entity: EntityType,
        account_id: impl Into<String>,
        since_state: impl Into<String>,
    ) -> Self {
        ChangesCall {
            entity,
            account_id: account_id.into(),
            since_state: since_state.into(),
            max_changes: None,
        }
    }
}

/// `Foo/query`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub entity: EntityType,
    pub account_id: String,
    pub filter: Option<Filter>,
    pub sort: Vec<Comparator>,
    pub collapse_threads: bool,
    pub position: Option<i64>,
    pub anchor: Option<String>,
    pub anchor_offset: Option<i64>,
    pub limit: Option<u64>,
    pub calculate_total: bool,
}

impl QueryCall {
    /// An `Email/query` for the first page of `query`.
    pub fn email(account_id: impl Into<String>, query: &EmailQuery) -> Self {
        QueryCall {
            entity: EntityType::Email,
            account_id: account_id.into(),
            filter: query.filter.clone(),
            sort: query.sort.clone(),
            collapse_threads: query.collapse_threads,
            position: Some(0),
            anchor: None,
            anchor_offset: None,
            limit: None,
            calculate_total: false,
        }
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Requests the page following `anchor`.
    pub fn after(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self.anchor_offset = Some(1);
        self.position = None;
        self
    }
}

/// `Foo/queryChanges`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryChangesCall {
    pub entity: EntityType,
    pub account_id: String,
    pub filter: Option<Filter>,
    pub sort: Vec<Comparator>,
    pub collapse_threads: bool,
    pub since_query_state: String,
    pub max_changes: Option<u64>,
    pub up_to_id: Option<String>,
    pub calculate_total: bool,
}

impl QueryChangesCall {
    pub fn email(
        account_id: impl Into<String>,
        query: &EmailQuery,
        since_query_state: impl Into<String>,
    ) -> Self {
        QueryChangesCall {
            entity: EntityType::Email,
            account_id: account_id.into(),
            filter: query.filter.clone(),
            sort: query.sort.clone(),
            collapse_threads: query.collapse_threads,
            since_query_state: since_query_state.into(),
            max_changes: None,
            up_to_id: None,
            calculate_total: false,
        }
    }

    pub fn up_to(mut self, id: Option<String>) -> Self {
        self.up_to_id = id;
        self
    }
}

/// `Foo/set`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCall {
    pub entity: EntityType,
    pub account_id: String,
    pub if_in_state: Option<String>,
    /// Creation id to object.
    pub create: BTreeMap<String, Value>,
    /// Object id to patch object.
    pub update: BTreeMap<String, Map<String, Value>>,
    pub destroy: Option<Arg<Vec<String>>>,
    /// EmailSubmission only: patches applied to the submitted emails.
    pub on_success_update_email: BTreeMap<String, Map<String, Value>>,
}

impl SetCall {
    pub fn new(entity: EntityType, account_id: impl Into<String>) -> Self {
        SetCall {
            entity,
            account_id: account_id.into(),
            if_in_state: None,
            create: BTreeMap::new(),
            update: BTreeMap::new(),
            destroy: None,
            on_success_update_email: BTreeMap::new(),
        }
    }

    pub fn if_in_state(mut self, state: Option<String>) -> Self {
        self.if_in_state = state;
        self
    }

    pub fn create(mut self, creation_id: impl Into<String>, object: Value) -> Self {
        self.create.insert(creation_id.into(), object);
        self
    }

    pub fn update(mut self, id: impl Into<String>, patch: Map<String, Value>) -> Self {
        self.update.entry(id.into()).or_default().extend(patch);
        self
    }

    pub fn destroy(mut self, ids: Vec<String>) -> Result<Self> {
        Arg::assign(&mut self.destroy, Arg::Literal(ids), "destroy")?;
        Ok(self)
    }

    pub fn on_success_update_email(
        mut self,
        key: impl Into<String>,
        patch: Map<String, Value>,
    ) -> Self {
        self.on_success_update_email.insert(key.into(), patch);
        self
    }
}

/// One method call of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodCall {
    Get(GetCall),
    Changes(ChangesCall),
    Query(QueryCall),
    QueryChanges(QueryChangesCall),
    Set(SetCall),
}

impl MethodCall {
    pub fn name(&self) -> MethodName {
        match self {
            MethodCall::Get(c) => MethodName::new(c.entity, Verb::Get),
            MethodCall::Changes(c) => MethodName::new(c.entity, Verb::Changes),
            MethodCall::Query(c) => MethodName::new(c.entity, Verb::Query),
            MethodCall::QueryChanges(c) => MethodName::new(c.entity, Verb::QueryChanges),
            MethodCall::Set(c) => MethodName::new(c.entity, Verb::Set),
        }
    }

    /// Capabilities this call needs, including ones implied by populated fields.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut namespaces = vec![self.name().entity.namespace()];
        if let MethodCall::Set(c) = self {
            if !c.on_success_update_email.is_empty() {
                namespaces.push(Namespace::Mail);
            }
        }
        namespaces
    }

    /// Result references this call consumes.
    pub fn references(&self) -> Vec<&ResultReference> {
        match self {
            MethodCall::Get(c) => [&c.ids, &c.properties]
                .into_iter()
                .filter_map(|a| a.as_ref().and_then(Arg::reference))
                .collect(),
            MethodCall::Set(c) => c.destroy.iter().filter_map(Arg::reference).collect(),
            MethodCall::Changes(_) | MethodCall::Query(_) | MethodCall::QueryChanges(_) => Vec::new(),
        }
    }

    /// Creation ids this call declares.
    pub fn creation_ids(&self) -> Vec<&str> {
        match self {
            MethodCall::Set(c) => c.create.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Creation-id references (`#id`) this call uses as patch keys or ids.
    pub fn creation_references(&self) -> Vec<&str> {
        let MethodCall::Set(c) = self else {
            return Vec::new();
        };
        let mut refs = Vec::new();
        for patch in c.update.values().chain(c.on_success_update_email.values()) {
            for key in patch.keys() {
                if let Some((_, last)) = key.rsplit_once('/') {
                    if let Some(id) = last.strip_prefix('#') {
                        refs.push(id);
                    }
                }
            }
        }
        for key in c.on_success_update_email.keys() {
            if let Some(id) = key.strip_prefix('#') {
                refs.push(id);
            }
        }
        refs
    }

    /// Encodes the arguments object.
    pub fn arguments(&self) -> Result<Map<String, Value>> {
        let mut args = Arguments::default();
        match self {
            MethodCall::Get(c) => {
                args.put("accountId", &c.account_id)?;
                args.put_arg("ids", &c.ids)?;
                args.put_arg("properties", &c.properties)?;
            }
            MethodCall::Changes(c) => {
                args.put("accountId", &c.account_id)?;
                args.put("sinceState", &c.since_state)?;
                args.put_opt("maxChanges", &c.max_changes)?;
            }
            MethodCall::Query(c) => {
                args.put("accountId", &c.account_id)?;
                args.put_opt("filter", &c.filter)?;
                if !c.sort.is_empty() {
                    args.put("sort", &c.sort)?;
                }
                if c.collapse_threads {
                    args.put("collapseThreads", &true)?;
                }
                args.put_opt("position", &c.position)?;
                args.put_opt("anchor", &c.anchor)?;
                args.put_opt("anchorOffset", &c.anchor_offset)?;
                args.put_opt("limit", &c.limit)?;
                if c.calculate_total {
                    args.put("calculateTotal", &true)?;
                }
            }
            MethodCall::QueryChanges(c) => {
                args.put("accountId", &c.account_id)?;
                args.put_opt("filter", &c.filter)?;
                if !c.sort.is_empty() {
                    args.put("sort", &c.sort)?;
                }
                if c.collapse_threads {
                    args.put("collapseThreads", &true)?;
                }
                args.put("sinceQueryState", &c.since_query_state)?;
                args.put_opt("maxChanges", &c.max_changes)?;
                args.put_opt("upToId", &c.up_to_id)?;
                if c.calculate_total {
                    args.put("calculateTotal", &true)?;
                }
            }
            MethodCall::Set(c) => {
                args.put("accountId", &c.account_id)?;
                args.put_opt("ifInState", &c.if_in_state)?;
                if !c.create.is_empty() {
                    args.put("create", &c.create)?;
                }
                if !c.update.is_empty() {
                    args.put("update", &c.update)?;
                }
                args.put_arg("destroy", &c.destroy)?;
                if !c.on_success_update_email.is_empty() {
                    args.put("onSuccessUpdateEmail", &c.on_success_update_email)?;
                }
            }
        }
        Ok(args.0)
    }
}

/// Arguments object under construction.
#[derive(Default)]
struct Arguments(Map<String, Value>);

impl Arguments {
    fn put<V: Serialize + ?Sized>(&mut self, key: &str, value: &V) -> Result<()> {
        self.0.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    fn put_opt<V: Serialize>(&mut self, key: &str, value: &Option<V>) -> Result<()> {
        if let Some(value) = value {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Writes a literal under `key` or a reference under `#key`.
    fn put_arg<V: Serialize>(&mut self, key: &str, arg: &Option<Arg<V>>) -> Result<()> {
        match arg {
            Some(Arg::Literal(value)) => self.put(key, value),
            Some(Arg::Deferred(reference)) => self.put(&format!("#{key}"), reference),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "method_tests.rs"]
mod tests;

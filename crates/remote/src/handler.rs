// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Method dispatch for one request.
//!
//! Invocations run in order against the store. Each produces one response
//! (two for an EmailSubmission/set with `onSuccessUpdateEmail`) under the
//! invocation's id, or an `error` response. Result references are resolved
//! against the responses produced so far.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use mua_core::entity::{Email, EmailSubmission, EntityType, Identity, Role, MAILBOX_COUNTERS};
use mua_core::method::{MethodName, Namespace, Verb};
use mua_core::protocol::UNKNOWN_CAPABILITY;
use mua_core::query::{Comparator, Filter};
use mua_core::reference::{evaluate, ResultReference};
use mua_core::response::{
    MethodError, MethodErrorType, Request, Response, SetError, WireInvocation, ERROR_NAME,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::search::Search;
use crate::store::{new_mailbox, MailStore, Pending};

/// Session state reported with every response. The mock never changes it.
pub const SESSION_STATE: &str = "s0";

/// A request rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub kind: &'static str,
    pub status: u16,
    pub detail: String,
}

type MethodResult<T> = Result<T, MethodError>;

fn method_error(kind: MethodErrorType, description: impl Into<String>) -> MethodError {
    MethodError::new(kind).describe(description)
}

fn set_error(kind: &str, description: impl Into<String>) -> SetError {
    SetError {
        kind: kind.to_string(),
        description: Some(description.into()),
    }
}

/// Executes every invocation of `request` against `store`.
pub fn execute(store: &mut MailStore, request: Request) -> Result<Response, RequestFailure> {
    let mut using = BTreeSet::new();
    for uri in &request.using {
        match Namespace::from_uri(uri) {
            Some(namespace) => {
                using.insert(namespace);
            }
            None => {
                return Err(RequestFailure {
                    kind: UNKNOWN_CAPABILITY,
                    status: 400,
                    detail: format!("unknown capability '{uri}'"),
                })
            }
        }
    }

    let mut handler = Handler {
        store,
        using,
        created_ids: BTreeMap::new(),
        responses: Vec::new(),
    };
    for WireInvocation(name, arguments, id) in request.method_calls {
        match handler.invoke(&name, arguments) {
            Ok(outputs) => {
                for (name, payload) in outputs {
                    handler
                        .responses
                        .push(WireInvocation(name, payload, id.clone()));
                }
            }
            Err(error) => {
                debug!(method = %name, %id, error = %error, "method failed");
                let payload = serde_json::to_value(&error).unwrap_or(Value::Null);
                handler
                    .responses
                    .push(WireInvocation(ERROR_NAME.to_string(), payload, id));
            }
        }
    }

    let created_ids = (!handler.created_ids.is_empty()).then(|| {
        handler
            .created_ids
            .iter()
            .map(|(cid, id)| (cid.clone(), Value::String(id.clone())))
            .collect()
    });
    Ok(Response {
        method_responses: handler.responses,
        created_ids,
        session_state: SESSION_STATE.to_string(),
    })
}

struct Handler<'a> {
    store: &'a mut MailStore,
    using: BTreeSet<Namespace>,
    /// Creation id to server id, across the request.
    created_ids: BTreeMap<String, String>,
    responses: Vec<WireInvocation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetArgs {
    #[serde(default)]
    ids: Option<Vec<String>>,
    #[serde(default)]
    properties: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangesArgs {
    since_state: String,
    #[serde(default)]
    max_changes: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryArgs {
    #[serde(default)]
    filter: Option<Filter>,
    #[serde(default)]
    sort: Vec<Comparator>,
    #[serde(default)]
    collapse_threads: bool,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    anchor: Option<String>,
    #[serde(default)]
    anchor_offset: i64,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    calculate_total: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryChangesArgs {
    #[serde(default)]
    filter: Option<Filter>,
    #[serde(default)]
    sort: Vec<Comparator>,
    #[serde(default)]
    collapse_threads: bool,
    since_query_state: String,
    #[serde(default)]
    max_changes: Option<usize>,
    #[serde(default)]
    up_to_id: Option<String>,
    #[serde(default)]
    calculate_total: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetArgs {
    #[serde(default)]
    if_in_state: Option<String>,
    #[serde(default)]
    create: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    update: Option<BTreeMap<String, Map<String, Value>>>,
    #[serde(default)]
    destroy: Option<Vec<String>>,
    #[serde(default)]
    on_success_update_email: Option<BTreeMap<String, Map<String, Value>>>,
}

fn parse<T: DeserializeOwned>(arguments: Map<String, Value>) -> MethodResult<T> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| method_error(MethodErrorType::InvalidArguments, e.to_string()))
}

/// Outcome of a Set, in wire form.
#[derive(Default)]
struct SetOutcome {
    created: Map<String, Value>,
    updated: Map<String, Value>,
    destroyed: Vec<String>,
    not_created: Map<String, Value>,
    not_updated: Map<String, Value>,
    not_destroyed: Map<String, Value>,
    /// Submission creation id to server id.
    submissions: BTreeMap<String, String>,
}

fn record(map: &mut Map<String, Value>, key: &str, error: SetError) {
    map.insert(
        key.to_string(),
        serde_json::to_value(error).unwrap_or(Value::Null),
    );
}

fn non_empty(map: Map<String, Value>) -> Value {
    if map.is_empty() {
        Value::Null
    } else {
        Value::Object(map)
    }
}

impl Handler<'_> {
    fn invoke(&mut self, name: &str, arguments: Value) -> MethodResult<Vec<(String, Value)>> {
        let method: MethodName = name
            .parse()
            .map_err(|e: String| method_error(MethodErrorType::UnknownMethod, e))?;
        if !self.using.contains(&method.entity.namespace()) {
            return Err(method_error(
                MethodErrorType::UnknownMethod,
                format!("{name} requires {}", method.entity.namespace().uri()),
            ));
        }
        let Value::Object(arguments) = arguments else {
            return Err(method_error(
                MethodErrorType::InvalidArguments,
                "arguments must be an object",
            ));
        };
        let arguments = self.resolve_references(arguments)?;
        match arguments.get("accountId").and_then(Value::as_str) {
            Some(account) if account == self.store.account_id() => {}
            other => {
                return Err(method_error(
                    MethodErrorType::AccountNotFound,
                    format!("no account {other:?}"),
                ))
            }
        }

        let entity = method.entity;
        match (entity, method.verb) {
            (_, Verb::Get) => Ok(vec![(name.to_string(), self.get(entity, parse(arguments)?)?)]),
            (_, Verb::Changes) => Ok(vec![(
                name.to_string(),
                self.changes(entity, parse(arguments)?)?,
            )]),
            (EntityType::Email, Verb::Query) => {
                Ok(vec![(name.to_string(), self.query(parse(arguments)?)?)])
            }
            (EntityType::Email, Verb::QueryChanges) => {
                Ok(vec![(name.to_string(), self.query_changes(parse(arguments)?)?)])
            }
            (EntityType::Thread, Verb::Set) => Err(method_error(
                MethodErrorType::UnknownMethod,
                "threads are read-only",
            )),
            (_, Verb::Set) => self.set(entity, parse(arguments)?),
            _ => Err(method_error(MethodErrorType::UnknownMethod, name)),
        }
    }

    /// Replaces every `#name` argument with the value it references.
    fn resolve_references(&self, arguments: Map<String, Value>) -> MethodResult<Map<String, Value>> {
        let mut resolved = Map::new();
        for (key, value) in &arguments {
            let Some(plain) = key.strip_prefix('#') else {
                continue;
            };
            if arguments.contains_key(plain) {
                return Err(method_error(
                    MethodErrorType::InvalidArguments,
                    format!("both '{plain}' and '{key}' given"),
                ));
            }
            let reference: ResultReference = serde_json::from_value(value.clone())
                .map_err(|e| method_error(MethodErrorType::InvalidResultReference, e.to_string()))?;
            let name = reference.name.to_string();
            let source = self
                .responses
                .iter()
                .find(|r| r.id() == reference.result_of && r.name() == name)
                .ok_or_else(|| {
                    method_error(
                        MethodErrorType::InvalidResultReference,
                        format!("no {name} response for '{}'", reference.result_of),
                    )
                })?;
            let value = evaluate(source.arguments(), &reference.path).map_err(|e| {
                method_error(MethodErrorType::InvalidResultReference, e.to_string())
            })?;
            resolved.insert(plain.to_string(), value);
        }
        let mut out: Map<String, Value> = arguments
            .into_iter()
            .filter(|(k, _)| !k.starts_with('#'))
            .collect();
        out.extend(resolved);
        Ok(out)
    }

    fn object(&self, entity: EntityType, id: &str) -> Option<Value> {
        let value = match entity {
            EntityType::Email => serde_json::to_value(self.store.email(id)?),
            EntityType::Mailbox => serde_json::to_value(self.store.mailbox(id)?),
            EntityType::Thread => serde_json::to_value(self.store.thread(id)?),
            EntityType::Identity => serde_json::to_value(self.store.identity(id)?),
            EntityType::EmailSubmission => serde_json::to_value(self.store.submission(id)?),
        };
        value.ok()
    }

    fn all_ids(&self, entity: EntityType) -> Vec<String> {
        match entity {
            EntityType::Email => self.store.emails().into_iter().map(|e| e.id).collect(),
            EntityType::Mailbox => self.store.mailboxes().into_iter().map(|m| m.id).collect(),
            EntityType::Thread => self.store.threads().into_iter().map(|t| t.id).collect(),
            EntityType::Identity => self.store.identities().into_iter().map(|i| i.id).collect(),
            EntityType::EmailSubmission => {
                self.store.submissions().into_iter().map(|s| s.id).collect()
            }
        }
    }

    fn get(&self, entity: EntityType, args: GetArgs) -> MethodResult<Value> {
        let ids = match args.ids {
            Some(ids) => {
                if let Some(max) = self.store.max_objects_in_get() {
                    if ids.len() > max {
                        return Err(method_error(
                            MethodErrorType::RequestTooLarge,
                            format!("{} ids requested, at most {max} allowed", ids.len()),
                        ));
                    }
                }
                ids.into_iter()
                    .map(|id| self.resolve_id(&id).unwrap_or(id))
                    .collect()
            }
            None => self.all_ids(entity),
        };

        let mut list = Vec::new();
        let mut not_found = Vec::new();
        for id in ids {
            match self.object(entity, &id) {
                Some(Value::Object(mut object)) => {
                    if let Some(properties) = &args.properties {
                        object.retain(|k, _| k == "id" || properties.iter().any(|p| p == k));
                    }
                    list.push(Value::Object(object));
                }
                _ => not_found.push(id),
            }
        }
        Ok(json!({
            "accountId": self.store.account_id(),
            "state": self.store.state(entity),
            "list": list,
            "notFound": not_found,
        }))
    }

    fn changes(&mut self, entity: EntityType, args: ChangesArgs) -> MethodResult<Value> {
        let cannot = || {
            method_error(
                MethodErrorType::CannotCalculateChanges,
                format!("cannot calculate {entity} changes since '{}'", args.since_state),
            )
        };
        if self.store.take_changes_fault(entity) {
            return Err(cannot());
        }
        let since: u64 = args.since_state.parse().map_err(|_| cannot())?;
        let changes = self
            .store
            .changes_since(entity, since, args.max_changes)
            .ok_or_else(cannot)?;

        let mut response = json!({
            "accountId": self.store.account_id(),
            "oldState": args.since_state,
            "newState": changes.new_state.to_string(),
            "hasMoreChanges": changes.has_more,
            "created": changes.created,
            "updated": changes.updated,
            "destroyed": changes.destroyed,
        });
        if entity == EntityType::Mailbox {
            let properties = if changes.counters_only {
                json!(MAILBOX_COUNTERS)
            } else {
                Value::Null
            };
            response["updatedProperties"] = properties;
        }
        Ok(response)
    }

    fn query(&mut self, args: QueryArgs) -> MethodResult<Value> {
        let search = Search {
            filter: args.filter,
            sort: args.sort,
            collapse_threads: args.collapse_threads,
        };
        let ids = search.run(self.store.emails_map())?;
        let total = ids.len();

        let start = match &args.anchor {
            Some(anchor) => {
                if self.store.take_anchor_fault() {
                    return Err(method_error(MethodErrorType::AnchorNotFound, anchor.clone()));
                }
                let index = ids
                    .iter()
                    .position(|id| id == anchor)
                    .ok_or_else(|| method_error(MethodErrorType::AnchorNotFound, anchor.clone()))?;
                (index as i64 + args.anchor_offset).max(0) as usize
            }
            None => match args.position.unwrap_or(0) {
                p if p < 0 => (total as i64 + p).max(0) as usize,
                p => p as usize,
            },
        };
        let start = start.min(total);

        let limit = match (args.limit, self.store.max_objects_in_get()) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (limit, max) => limit.or(max),
        };
        let end = limit.map_or(total, |l| (start + l).min(total));
        let page = &ids[start..end];

        let mut response = json!({
            "accountId": self.store.account_id(),
            "queryState": self.store.state(EntityType::Email),
            "canCalculateChanges": true,
            "position": start,
            "ids": page,
        });
        if args.calculate_total {
            response["total"] = json!(total);
        }
        if let Some(limit) = limit.filter(|l| args.limit != Some(*l)) {
            response["limit"] = json!(limit);
        }
        Ok(response)
    }

    fn query_changes(&mut self, args: QueryChangesArgs) -> MethodResult<Value> {
        let cannot = || {
            method_error(
                MethodErrorType::CannotCalculateChanges,
                format!("cannot calculate query changes since '{}'", args.since_query_state),
            )
        };
        if self.store.take_query_changes_fault() {
            return Err(cannot());
        }
        let since: u64 = args.since_query_state.parse().map_err(|_| cannot())?;
        let search = Search {
            filter: args.filter,
            sort: args.sort,
            collapse_threads: args.collapse_threads,
        };
        let mut old = search.run(self.store.snapshot(since).ok_or_else(cannot)?)?;
        let new = search.run(self.store.emails_map())?;

        if let Some(up_to) = &args.up_to_id {
            if let Some(index) = old.iter().position(|id| id == up_to) {
                old.truncate(index + 1);
            }
        }

        let kept = common_subsequence(&old, &new);
        let removed: Vec<&String> = old.iter().filter(|id| !kept.contains(*id)).collect();
        let added: Vec<Value> = new
            .iter()
            .enumerate()
            .filter(|(_, id)| !kept.contains(*id))
            .map(|(index, id)| json!({ "id": id, "index": index }))
            .collect();

        if let Some(max) = args.max_changes {
            if removed.len() + added.len() > max {
                return Err(method_error(
                    MethodErrorType::TooManyChanges,
                    format!("more than {max} changes"),
                ));
            }
        }

        let mut response = json!({
            "accountId": self.store.account_id(),
            "oldQueryState": args.since_query_state,
            "newQueryState": self.store.state(EntityType::Email),
            "removed": removed,
            "added": added,
        });
        if args.calculate_total {
            response["total"] = json!(new.len());
        }
        Ok(response)
    }

    fn set(&mut self, entity: EntityType, args: SetArgs) -> MethodResult<Vec<(String, Value)>> {
        let old_state = self.store.state(entity);
        if let Some(expected) = &args.if_in_state {
            if *expected != old_state {
                return Err(method_error(
                    MethodErrorType::StateMismatch,
                    format!("{entity} state is '{old_state}', not '{expected}'"),
                ));
            }
        }
        let on_success = args.on_success_update_email.unwrap_or_default();
        if !on_success.is_empty() {
            if entity != EntityType::EmailSubmission {
                return Err(method_error(
                    MethodErrorType::InvalidArguments,
                    "onSuccessUpdateEmail is only valid for EmailSubmission/set",
                ));
            }
            if !self.using.contains(&Namespace::Mail) {
                return Err(method_error(
                    MethodErrorType::UnknownMethod,
                    "onSuccessUpdateEmail requires the mail capability",
                ));
            }
        }

        let mut outcome = SetOutcome::default();
        let mut pending = self.store.begin();
        for (cid, object) in args.create.unwrap_or_default() {
            match self.create(&mut pending, entity, &object) {
                Ok(id) => {
                    if entity == EntityType::EmailSubmission {
                        outcome.submissions.insert(cid.clone(), id.clone());
                    }
                    self.created_ids.insert(cid.clone(), id.clone());
                    outcome.created.insert(cid, json!({ "id": id }));
                }
                Err(error) => record(&mut outcome.not_created, &cid, error),
            }
        }
        for (id, patch) in args.update.unwrap_or_default() {
            let target = self.resolve_id(&id);
            match target.and_then(|target| self.update(&mut pending, entity, &target, &patch)) {
                Ok(()) => {
                    outcome.updated.insert(id, Value::Null);
                }
                Err(error) => record(&mut outcome.not_updated, &id, error),
            }
        }
        for id in args.destroy.unwrap_or_default() {
            let target = self.resolve_id(&id);
            match target.and_then(|target| self.destroy(&mut pending, entity, &target)) {
                Ok(()) => outcome.destroyed.push(id),
                Err(error) => record(&mut outcome.not_destroyed, &id, error),
            }
        }
        self.store.commit(pending);

        let submissions = outcome.submissions.clone();
        let mut outputs = vec![(
            MethodName::new(entity, Verb::Set).to_string(),
            self.set_response(entity, old_state, outcome),
        )];

        if !on_success.is_empty() {
            let email_state = self.store.state(EntityType::Email);
            let mut implicit = SetOutcome::default();
            let mut pending = self.store.begin();
            for (key, patch) in on_success {
                let submission_id = match key.strip_prefix('#') {
                    Some(cid) => submissions.get(cid).cloned(),
                    None => Some(key.clone()),
                };
                let Some(email_id) = submission_id
                    .and_then(|id| self.store.submission(&id))
                    .map(|s| s.email_id)
                else {
                    continue;
                };
                match self.update(&mut pending, EntityType::Email, &email_id, &patch) {
                    Ok(()) => {
                        implicit.updated.insert(email_id, Value::Null);
                    }
                    Err(error) => record(&mut implicit.not_updated, &email_id, error),
                }
            }
            self.store.commit(pending);
            outputs.push((
                MethodName::new(EntityType::Email, Verb::Set).to_string(),
                self.set_response(EntityType::Email, email_state, implicit),
            ));
        }
        Ok(outputs)
    }

    fn set_response(&self, entity: EntityType, old_state: String, outcome: SetOutcome) -> Value {
        json!({
            "accountId": self.store.account_id(),
            "oldState": old_state,
            "newState": self.store.state(entity),
            "created": non_empty(outcome.created),
            "updated": non_empty(outcome.updated),
            "destroyed": if outcome.destroyed.is_empty() { Value::Null } else { json!(outcome.destroyed) },
            "notCreated": non_empty(outcome.not_created),
            "notUpdated": non_empty(outcome.not_updated),
            "notDestroyed": non_empty(outcome.not_destroyed),
        })
    }

    /// Maps `#cid` to the id created for it earlier in the request.
    fn resolve_id(&self, id: &str) -> Result<String, SetError> {
        match id.strip_prefix('#') {
            Some(cid) => self
                .created_ids
                .get(cid)
                .cloned()
                .ok_or_else(|| set_error("notFound", format!("unknown creation id '{cid}'"))),
            None => Ok(id.to_string()),
        }
    }

    fn create(
        &mut self,
        pending: &mut Pending,
        entity: EntityType,
        object: &Value,
    ) -> Result<String, SetError> {
        let field = |name: &str| object.get(name).and_then(Value::as_str).map(str::to_string);
        match entity {
            EntityType::Mailbox => {
                let name = field("name")
                    .ok_or_else(|| set_error("invalidProperties", "name is required"))?;
                let role = match field("role") {
                    Some(role) => Some(
                        role.parse::<Role>()
                            .map_err(|e| set_error("invalidProperties", e))?,
                    ),
                    None => None,
                };
                let id = self.store.fresh_id("mb");
                let mut mailbox = new_mailbox(id.clone(), &name, role);
                mailbox.parent_id = field("parentId");
                self.store.insert_mailbox(pending, mailbox);
                Ok(id)
            }
            EntityType::Email => {
                let mut mailbox_ids = BTreeMap::new();
                if let Some(Value::Object(map)) = object.get("mailboxIds") {
                    for (key, value) in map {
                        if value.as_bool() == Some(true) {
                            mailbox_ids.insert(self.resolve_mailbox(key)?, true);
                        }
                    }
                }
                if mailbox_ids.is_empty() {
                    return Err(set_error("invalidProperties", "mailboxIds must not be empty"));
                }
                let keywords = match object.get("keywords") {
                    Some(value) => serde_json::from_value(value.clone())
                        .map_err(|e| set_error("invalidProperties", e.to_string()))?,
                    None => BTreeMap::new(),
                };
                let received_at = match object.get("receivedAt") {
                    Some(value) => serde_json::from_value::<DateTime<Utc>>(value.clone())
                        .map_err(|e| set_error("invalidProperties", e.to_string()))?,
                    None => Utc::now(),
                };
                let id = self.store.fresh_id("M");
                let thread_id = self.store.fresh_id("T");
                let subject = field("subject");
                self.store.insert_email(
                    pending,
                    Email {
                        id: id.clone(),
                        thread_id,
                        mailbox_ids,
                        keywords,
                        received_at: Some(received_at),
                        preview: subject.clone(),
                        subject,
                        from: None,
                    },
                );
                Ok(id)
            }
            EntityType::Identity => {
                let email = field("email")
                    .ok_or_else(|| set_error("invalidProperties", "email is required"))?;
                let id = self.store.fresh_id("I");
                self.store.insert_identity(
                    pending,
                    Identity {
                        id: id.clone(),
                        name: field("name").unwrap_or_default(),
                        email,
                    },
                );
                Ok(id)
            }
            EntityType::EmailSubmission => {
                let identity_id = field("identityId")
                    .ok_or_else(|| set_error("invalidProperties", "identityId is required"))?;
                if self.store.identity(&identity_id).is_none() {
                    return Err(set_error("invalidProperties", "unknown identity"));
                }
                let email_id = self.resolve_id(
                    &field("emailId")
                        .ok_or_else(|| set_error("invalidProperties", "emailId is required"))?,
                )?;
                let email = self
                    .store
                    .email(&email_id)
                    .ok_or_else(|| set_error("invalidProperties", "unknown email"))?;
                let id = self.store.fresh_id("S");
                self.store.insert_submission(
                    pending,
                    EmailSubmission {
                        id: id.clone(),
                        identity_id,
                        email_id,
                        thread_id: Some(email.thread_id),
                    },
                );
                Ok(id)
            }
            EntityType::Thread => Err(set_error("forbidden", "threads are read-only")),
        }
    }

    fn resolve_mailbox(&self, key: &str) -> Result<String, SetError> {
        let id = self
            .resolve_id(key)
            .map_err(|e| set_error("invalidProperties", e.description.unwrap_or_default()))?;
        if !self.store.has_mailbox(&id) {
            return Err(set_error("invalidProperties", format!("unknown mailbox '{id}'")));
        }
        Ok(id)
    }

    fn update(
        &mut self,
        pending: &mut Pending,
        entity: EntityType,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<(), SetError> {
        let not_found = || set_error("notFound", format!("{entity} '{id}' not found"));
        match entity {
            EntityType::Email => {
                let mut email = self.store.email(id).ok_or_else(not_found)?;
                for (key, value) in patch {
                    match key.split_once('/') {
                        Some(("keywords", keyword)) => match value {
                            Value::Bool(true) => {
                                email.keywords.insert(keyword.to_string(), true);
                            }
                            Value::Null | Value::Bool(false) => {
                                email.keywords.remove(keyword);
                            }
                            _ => return Err(set_error("invalidPatch", key.clone())),
                        },
                        Some(("mailboxIds", mailbox)) => {
                            let mailbox = self.resolve_mailbox(mailbox)?;
                            match value {
                                Value::Bool(true) => {
                                    email.mailbox_ids.insert(mailbox, true);
                                }
                                Value::Null | Value::Bool(false) => {
                                    email.mailbox_ids.remove(&mailbox);
                                }
                                _ => return Err(set_error("invalidPatch", key.clone())),
                            }
                        }
                        None if key == "keywords" => {
                            email.keywords = serde_json::from_value(value.clone())
                                .map_err(|e| set_error("invalidProperties", e.to_string()))?;
                        }
                        None if key == "mailboxIds" => {
                            let mut mailboxes = BTreeMap::new();
                            if let Value::Object(map) = value {
                                for mailbox in map.keys() {
                                    mailboxes.insert(self.resolve_mailbox(mailbox)?, true);
                                }
                            }
                            email.mailbox_ids = mailboxes;
                        }
                        _ => {
                            return Err(set_error(
                                "invalidProperties",
                                format!("'{key}' cannot be changed"),
                            ))
                        }
                    }
                }
                if email.mailbox_ids.is_empty() {
                    return Err(set_error(
                        "invalidProperties",
                        "an email must belong to at least one mailbox",
                    ));
                }
                if let Some(stored) = self.store.email_mut(pending, id) {
                    *stored = email;
                }
                Ok(())
            }
            EntityType::Mailbox => {
                let mut mailbox = self.store.mailbox(id).ok_or_else(not_found)?;
                for (key, value) in patch {
                    match (key.as_str(), value) {
                        ("name", Value::String(name)) => mailbox.name = name.clone(),
                        ("parentId", Value::Null) => mailbox.parent_id = None,
                        ("parentId", Value::String(parent)) => {
                            mailbox.parent_id = Some(self.resolve_mailbox(parent)?)
                        }
                        ("sortOrder", Value::Number(n)) => {
                            mailbox.sort_order = n.as_u64().unwrap_or(0) as u32
                        }
                        ("role", Value::Null) => mailbox.role = None,
                        ("role", Value::String(role)) => {
                            mailbox.role = Some(
                                role.parse()
                                    .map_err(|e: String| set_error("invalidProperties", e))?,
                            )
                        }
                        _ => {
                            return Err(set_error(
                                "invalidProperties",
                                format!("'{key}' cannot be changed"),
                            ))
                        }
                    }
                }
                if let Some(stored) = self.store.mailbox_mut(pending, id) {
                    stored.name = mailbox.name;
                    stored.parent_id = mailbox.parent_id;
                    stored.sort_order = mailbox.sort_order;
                    stored.role = mailbox.role;
                }
                Ok(())
            }
            _ => Err(set_error("forbidden", format!("{entity} objects cannot be updated"))),
        }
    }

    fn destroy(&mut self, pending: &mut Pending, entity: EntityType, id: &str) -> Result<(), SetError> {
        let not_found = || set_error("notFound", format!("{entity} '{id}' not found"));
        match entity {
            EntityType::Email => self.store.remove_email(pending, id).map(drop).ok_or_else(not_found),
            EntityType::Mailbox => {
                if !self.store.has_mailbox(id) {
                    return Err(not_found());
                }
                if self.store.mailbox_has_email(id) {
                    return Err(set_error("mailboxHasEmail", format!("mailbox '{id}' is not empty")));
                }
                self.store.remove_mailbox(pending, id).map(drop).ok_or_else(not_found)
            }
            EntityType::Identity => self
                .store
                .remove_identity(pending, id)
                .map(drop)
                .ok_or_else(not_found),
            EntityType::EmailSubmission => self
                .store
                .remove_submission(pending, id)
                .map(drop)
                .ok_or_else(not_found),
            EntityType::Thread => Err(set_error("forbidden", "threads are read-only")),
        }
    }
}

/// Ids of a longest common subsequence of `old` and `new`.
fn common_subsequence(old: &[String], new: &[String]) -> HashSet<String> {
    let (n, m) = (old.len(), new.len());
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut kept = HashSet::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            kept.insert(old[i].clone());
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    kept
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

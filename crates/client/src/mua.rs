// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session façade.
//!
//! [`Mua`] ties one account's transport and cache together and exposes
//! refresh, query and mutation operations. Every operation is safe to call
//! again: a [`Status::HasMore`] result means another call will make progress.

use serde_json::{Map, Value};
use tracing::{debug, info};

use mua_core::entity::{DRAFT, FLAGGED, SEEN};
use mua_core::response::SetResponse;
use mua_core::{
    BatchBuilder, Cache, Call, Email, EmailQuery, EntityType, Error as CoreError, Identity,
    Mailbox, MethodCall, MethodName, ObjectsState, QueryItem, Role, Session, SetCall, Status,
    Thread, Verb,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sync::entity::{EntitySync, ObjectsSync};
use crate::sync::{query, Context, SyncOptions};
use crate::transport::{connect_with_retry, Transport, WebSocketTransport};
use crate::worker::CacheWorker;

/// One account's mail, mirrored into a local cache.
pub struct Mua<C: Cache, T: Transport = WebSocketTransport> {
    ctx: Context<C, T>,
}

impl<C: Cache> Mua<C, WebSocketTransport> {
    /// Connects to the server named in `config`, retrying with backoff.
    pub async fn connect(config: &Config, cache: C) -> Result<Self> {
        let mut transport = WebSocketTransport::new();
        info!("Connecting to {}", config.url);
        connect_with_retry(&mut transport, &config.url, &config.retry_policy()).await?;
        Mua::new(config.session(), transport, cache, config.sync_options())
    }
}

/// Where a mailbox patch points: an existing mailbox or one created in the
/// same batch.
enum Target {
    Existing(String),
    Created(Role),
}

impl Target {
    fn key(&self) -> String {
        match self {
            Target::Existing(id) => format!("mailboxIds/{id}"),
            Target::Created(role) => format!("mailboxIds/#{}", role.as_str()),
        }
    }
}

impl<C: Cache, T: Transport> Mua<C, T> {
    /// Builds a session over `transport` and moves `cache` onto its worker.
    pub fn new(session: Session, transport: T, cache: C, options: SyncOptions) -> Result<Self> {
        Ok(Mua {
            ctx: Context {
                session,
                transport,
                worker: CacheWorker::spawn(cache)?,
                options,
            },
        })
    }

    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    pub fn transport(&self) -> &T {
        &self.ctx.transport
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.ctx.transport.disconnect().await?;
        Ok(())
    }

    // Sync

    /// Syncs mailboxes, and emails and threads once any are cached.
    pub async fn refresh(&self) -> Result<Status> {
        let objects = self.objects_state().await?;
        let mut batch = BatchBuilder::new();
        let sync = ObjectsSync::plan(&mut batch, self.ctx.account_id(), &objects)?;
        let responses = self.ctx.send(&batch.build()).await?;
        sync.apply(&self.ctx, &responses).await
    }

    pub async fn refresh_mailboxes(&self) -> Result<Status> {
        self.refresh_entity::<Mailbox>().await
    }

    pub async fn refresh_identities(&self) -> Result<Status> {
        self.refresh_entity::<Identity>().await
    }

    async fn refresh_entity<E: mua_core::Entity>(&self) -> Result<Status> {
        let state = self.ctx.cache(|cache| cache.state::<E>()).await?;
        let mut batch = BatchBuilder::new();
        let sync = EntitySync::<E>::plan(&mut batch, self.ctx.account_id(), state.as_ref())?;
        let responses = self.ctx.send(&batch.build()).await?;
        sync.apply(&self.ctx, &responses).await
    }

    /// Loads or refreshes the cached result of `query`.
    pub async fn query(&self, q: &EmailQuery) -> Result<Status> {
        query::query(&self.ctx, q).await
    }

    /// Refreshes the cached result of `query` and appends its next page.
    pub async fn query_page(&self, q: &EmailQuery) -> Result<Status> {
        query::query_page(&self.ctx, q).await
    }

    /// Fetches threads and emails `query` refers to that are not cached.
    pub async fn fetch_missing(&self, q: &EmailQuery) -> Result<Status> {
        query::fetch_missing(&self.ctx, &q.fingerprint()?).await
    }

    // Keywords

    /// Sets `keyword` on every email of a thread.
    pub async fn set_keyword(&self, thread_id: &str, keyword: &str) -> Result<Status> {
        self.modify_keyword(thread_id, keyword, true).await
    }

    pub async fn remove_keyword(&self, thread_id: &str, keyword: &str) -> Result<Status> {
        self.modify_keyword(thread_id, keyword, false).await
    }

    pub async fn mark_read(&self, thread_id: &str) -> Result<Status> {
        self.modify_keyword(thread_id, SEEN, true).await
    }

    pub async fn mark_unread(&self, thread_id: &str) -> Result<Status> {
        self.modify_keyword(thread_id, SEEN, false).await
    }

    pub async fn flag(&self, thread_id: &str) -> Result<Status> {
        self.modify_keyword(thread_id, FLAGGED, true).await
    }

    pub async fn unflag(&self, thread_id: &str) -> Result<Status> {
        self.modify_keyword(thread_id, FLAGGED, false).await
    }

    async fn modify_keyword(&self, thread_id: &str, keyword: &str, value: bool) -> Result<Status> {
        let emails = self.thread_emails(thread_id).await?;
        let key = format!("keywords/{keyword}");
        let patch_value = if value { Value::Bool(true) } else { Value::Null };
        let patches: Vec<(String, Map<String, Value>)> = emails
            .into_iter()
            .filter(|e| e.has_keyword(keyword) != value)
            .map(|e| (e.id, Map::from_iter([(key.clone(), patch_value.clone())])))
            .collect();
        if patches.is_empty() {
            return Ok(Status::Unchanged);
        }
        debug!("Setting {}={} on {} emails of {}", keyword, value, patches.len(), thread_id);

        let objects = self.objects_state().await?;
        self.mutate(&objects, |batch| {
            let mut set = SetCall::new(EntityType::Email, self.ctx.account_id())
                .if_in_state(objects.email_state.as_ref().map(|s| s.to_string()));
            for (id, patch) in patches {
                set = set.update(id, patch);
            }
            Ok(vec![batch.call(MethodCall::Set(set))?])
        })
        .await
    }

    // Mailbox moves

    /// Moves a thread out of the inbox into the archive.
    pub async fn archive(&self, thread_id: &str) -> Result<Status> {
        self.move_thread(thread_id, Role::Archive, &[Role::Inbox]).await
    }

    /// Moves a thread into the trash, out of every other mailbox.
    pub async fn move_to_trash(&self, thread_id: &str) -> Result<Status> {
        self.move_thread(thread_id, Role::Trash, &[]).await
    }

    /// Moves a thread back to the inbox from the archive or the trash.
    pub async fn move_to_inbox(&self, thread_id: &str) -> Result<Status> {
        self.move_thread(thread_id, Role::Inbox, &[Role::Archive, Role::Trash])
            .await
    }

    /// Adds every email of a thread to the `to` mailbox, creating it if
    /// needed, and removes them from the `from` mailboxes. An empty `from`
    /// removes them from every other mailbox.
    async fn move_thread(&self, thread_id: &str, to: Role, from: &[Role]) -> Result<Status> {
        let emails = self.thread_emails(thread_id).await?;
        let mailboxes = self.loaded_mailboxes().await?;
        let target = match role_mailbox(&mailboxes, to) {
            Some(id) => Target::Existing(id),
            None => Target::Created(to),
        };
        let sources: Vec<String> = if from.is_empty() {
            mailboxes.iter().map(|m| m.id.clone()).collect()
        } else {
            from.iter().filter_map(|r| role_mailbox(&mailboxes, *r)).collect()
        };

        let mut patches = Vec::new();
        for email in emails {
            let mut patch = Map::new();
            let is_target = |id: &str| matches!(&target, Target::Existing(t) if t == id);
            for source in &sources {
                if email.in_mailbox(source) && !is_target(source) {
                    patch.insert(format!("mailboxIds/{source}"), Value::Null);
                }
            }
            if !email.mailbox_ids.keys().any(|id| is_target(id) && email.in_mailbox(id)) {
                patch.insert(target.key(), Value::Bool(true));
            }
            if !patch.is_empty() {
                patches.push((email.id, patch));
            }
        }
        if patches.is_empty() {
            return Ok(Status::Unchanged);
        }
        debug!("Moving {} emails of {} to {}", patches.len(), thread_id, to.as_str());

        let objects = self.objects_state().await?;
        self.mutate(&objects, |batch| {
            let mut calls = Vec::new();
            if let Target::Created(role) = &target {
                calls.push(self.create_role_mailbox(batch, *role)?);
            }
            let mut set = SetCall::new(EntityType::Email, self.ctx.account_id())
                .if_in_state(objects.email_state.as_ref().map(|s| s.to_string()));
            for (id, patch) in patches {
                set = set.update(id, patch);
            }
            calls.push(batch.call(MethodCall::Set(set))?);
            Ok(calls)
        })
        .await
    }

    // Submission

    /// Sends a draft as `identity_id`. On success the server clears the
    /// draft keyword and files the email under Sent instead of Drafts.
    pub async fn submit(&self, email_id: &str, identity_id: &str) -> Result<Status> {
        let email = self
            .email(email_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("email {email_id}")))?;
        let mailboxes = self.loaded_mailboxes().await?;
        let sent = match role_mailbox(&mailboxes, Role::Sent) {
            Some(id) => Target::Existing(id),
            None => Target::Created(Role::Sent),
        };

        let mut on_success = Map::new();
        on_success.insert(format!("keywords/{DRAFT}"), Value::Null);
        if let Some(drafts) = role_mailbox(&mailboxes, Role::Drafts) {
            if email.in_mailbox(&drafts) {
                on_success.insert(format!("mailboxIds/{drafts}"), Value::Null);
            }
        }
        on_success.insert(sent.key(), Value::Bool(true));
        info!("Submitting {} as {}", email_id, identity_id);

        let objects = self.objects_state().await?;
        self.mutate(&objects, |batch| {
            let mut calls = Vec::new();
            if let Target::Created(role) = &sent {
                calls.push(self.create_role_mailbox(batch, *role)?);
            }
            let set = SetCall::new(EntityType::EmailSubmission, self.ctx.account_id())
                .create(
                    "send",
                    serde_json::json!({ "identityId": identity_id, "emailId": email_id }),
                )
                .on_success_update_email("#send", on_success);
            calls.push(batch.call(MethodCall::Set(set))?);
            Ok(calls)
        })
        .await
    }

    // Reads

    pub async fn mailboxes(&self) -> Result<Vec<Mailbox>> {
        self.ctx.cache(|cache| cache.get_all::<Mailbox>()).await
    }

    pub async fn identities(&self) -> Result<Vec<Identity>> {
        self.ctx.cache(|cache| cache.get_all::<Identity>()).await
    }

    /// The cached prefix of a query result.
    pub async fn query_items(&self, q: &EmailQuery) -> Result<Vec<QueryItem>> {
        let key = q.fingerprint()?;
        self.ctx.cache(move |cache| cache.query_items(&key)).await
    }

    pub async fn thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let id = thread_id.to_string();
        self.ctx.cache(move |cache| cache.get::<Thread>(&id)).await
    }

    pub async fn email(&self, email_id: &str) -> Result<Option<Email>> {
        let id = email_id.to_string();
        self.ctx.cache(move |cache| cache.get::<Email>(&id)).await
    }

    // Helpers

    async fn objects_state(&self) -> Result<ObjectsState> {
        self.ctx.cache(|cache| cache.objects_state()).await
    }

    /// The cached emails of a thread, in thread order.
    async fn thread_emails(&self, thread_id: &str) -> Result<Vec<Email>> {
        let thread = self
            .thread(thread_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("thread {thread_id}")))?;
        let mut emails = Vec::with_capacity(thread.email_ids.len());
        for id in &thread.email_ids {
            let email = self
                .email(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("email {id} of thread {thread_id}")))?;
            emails.push(email);
        }
        Ok(emails)
    }

    /// Cached mailboxes, loading them first if they never were.
    async fn loaded_mailboxes(&self) -> Result<Vec<Mailbox>> {
        if self.objects_state().await?.mailbox_state.is_none() {
            self.refresh_mailboxes().await?;
        }
        self.mailboxes().await
    }

    /// Sends the Set calls `build` appends, followed by an objects sync.
    ///
    /// The sync is applied before any Set outcome is checked, so a rejected
    /// `ifInState` leaves the cache fresh for the next attempt.
    async fn mutate<F>(&self, objects: &ObjectsState, build: F) -> Result<Status>
    where
        F: FnOnce(&mut BatchBuilder) -> Result<Vec<Call>>,
    {
        let mut batch = BatchBuilder::new();
        let calls = build(&mut batch)?;
        let sync = ObjectsSync::plan(&mut batch, self.ctx.account_id(), objects)?;
        let responses = self.ctx.send(&batch.build()).await?;
        let status = sync.apply(&self.ctx, &responses).await?;

        let email_set = MethodName::new(EntityType::Email, Verb::Set);
        for call in &calls {
            let set: SetResponse = responses.get(call)?;
            check_set(&call.name().to_string(), &set)?;
            if call.name().entity == EntityType::EmailSubmission {
                if let Some(implicit) = responses.implicit::<SetResponse>(call, email_set)? {
                    check_set(&email_set.to_string(), &implicit)?;
                }
            }
        }
        Ok(status)
    }

    fn create_role_mailbox(&self, batch: &mut BatchBuilder, role: Role) -> Result<Call> {
        info!("Creating {} mailbox", role.as_str());
        let set = SetCall::new(EntityType::Mailbox, self.ctx.account_id()).create(
            role.as_str(),
            serde_json::json!({ "name": role.default_name(), "role": role.as_str() }),
        );
        Ok(batch.call(MethodCall::Set(set))?)
    }
}

fn role_mailbox(mailboxes: &[Mailbox], role: Role) -> Option<String> {
    mailboxes
        .iter()
        .find(|m| m.role == Some(role))
        .map(|m| m.id.clone())
}

fn check_set(call: &str, response: &SetResponse) -> Result<()> {
    let errors = response.failures()?;
    if errors.is_empty() {
        return Ok(());
    }
    Err(CoreError::SetFailed {
        call: call.to_string(),
        errors,
    }
    .into())
}

#[cfg(test)]
#[path = "mua_tests.rs"]
mod tests;

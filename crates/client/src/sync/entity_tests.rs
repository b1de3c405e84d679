// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use mua_core::entity::SEEN;
use mua_core::{EntityType, Identity, SqliteCache, StateToken};
use mua_remote::{MailStore, ServerState};

use super::*;
use crate::test_helpers::{context, LocalTransport};

type TestContext = Context<SqliteCache, LocalTransport>;

async fn sync<T: Entity>(ctx: &TestContext) -> Status {
    let state = ctx.cache(|c| c.state::<T>()).await.unwrap();
    let mut batch = BatchBuilder::new();
    let plan = EntitySync::<T>::plan(&mut batch, ctx.account_id(), state.as_ref()).unwrap();
    let responses = ctx.send(&batch.build()).await.unwrap();
    plan.apply(ctx, &responses).await.unwrap()
}

async fn cached<T: Entity>(ctx: &TestContext, id: &str) -> T {
    let id = id.to_string();
    ctx.cache(move |c| c.get::<T>(&id)).await.unwrap().unwrap()
}

async fn inbox(state: &ServerState) -> Mailbox {
    state.store().await.mailbox_by_role(mua_core::Role::Inbox).unwrap()
}

#[tokio::test]
async fn first_sync_loads_everything() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;

    assert_eq!(sync::<Mailbox>(&ctx).await, Status::Updated);

    let mailboxes = ctx.cache(|c| c.get_all::<Mailbox>()).await.unwrap();
    assert_eq!(mailboxes.len(), 2);
    let cached_state = ctx.cache(|c| c.state::<Mailbox>()).await.unwrap().unwrap();
    assert_eq!(cached_state.as_str(), state.store().await.state(EntityType::Mailbox));
}

#[tokio::test]
async fn sync_without_changes_is_unchanged_and_idempotent() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    sync::<Mailbox>(&ctx).await;
    let before = ctx.cache(|c| c.get_all::<Mailbox>()).await.unwrap();

    assert_eq!(sync::<Mailbox>(&ctx).await, Status::Unchanged);
    assert_eq!(sync::<Mailbox>(&ctx).await, Status::Unchanged);
    assert_eq!(ctx.cache(|c| c.get_all::<Mailbox>()).await.unwrap(), before);
}

#[tokio::test]
async fn counter_changes_only_touch_counters() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    sync::<Mailbox>(&ctx).await;
    let inbox = inbox(&state).await;
    let before: Mailbox = cached(&ctx, &inbox.id).await;

    let unread = state
        .store()
        .await
        .emails()
        .into_iter()
        .find(|e| e.in_mailbox(&inbox.id) && !e.has_keyword(SEEN))
        .unwrap();
    state.store().await.mark_read(&unread.id);

    assert_eq!(sync::<Mailbox>(&ctx).await, Status::Updated);
    let after: Mailbox = cached(&ctx, &inbox.id).await;
    assert_eq!(after.unread_emails, before.unread_emails - 1);
    assert_eq!(after.name, before.name);
    assert_eq!(after.role, before.role);
}

#[tokio::test]
async fn renamed_mailbox_is_replaced_whole() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    sync::<Mailbox>(&ctx).await;
    let inbox = inbox(&state).await;

    state.store().await.rename_mailbox(&inbox.id, "Incoming");

    assert_eq!(sync::<Mailbox>(&ctx).await, Status::Updated);
    let after: Mailbox = cached(&ctx, &inbox.id).await;
    assert_eq!(after.name, "Incoming");
}

#[tokio::test]
async fn email_updates_keep_immutable_properties() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    assert_eq!(sync::<Email>(&ctx).await, Status::Updated);
    let email = state.store().await.emails()[0].clone();

    state.store().await.set_keyword(&email.id, "$flagged", true);

    assert_eq!(sync::<Email>(&ctx).await, Status::Updated);
    let after: Email = cached(&ctx, &email.id).await;
    assert!(after.has_keyword("$flagged"));
    assert_eq!(after.subject, email.subject);
    assert_eq!(after.thread_id, email.thread_id);
}

#[tokio::test]
async fn update_of_uncached_email_keeps_the_partial_mirror() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    let emails = state.store().await.emails();
    let held = emails[0].clone();
    let other = emails[1].id.clone();
    let email_state = StateToken::new(state.store().await.state(EntityType::Email));
    let stored = held.clone();
    ctx.cache(move |c| c.add_entities(&email_state, &[stored]))
        .await
        .unwrap();

    state.store().await.set_keyword(&other, "$flagged", true);

    assert_eq!(sync::<Email>(&ctx).await, Status::Updated);
    let kept: Email = cached(&ctx, &held.id).await;
    assert_eq!(kept, held);
    let lookup = other.clone();
    assert!(ctx.cache(move |c| c.get::<Email>(&lookup)).await.unwrap().is_none());
    let cached_state = ctx.cache(|c| c.state::<Email>()).await.unwrap().unwrap();
    assert_eq!(cached_state.as_str(), state.store().await.state(EntityType::Email));
    assert_eq!(sync::<Email>(&ctx).await, Status::Unchanged);
}

#[tokio::test]
async fn created_and_destroyed_objects_are_applied() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    sync::<Identity>(&ctx).await;

    let added = state.store().await.add_identity("Work", "work@example.com");
    assert_eq!(sync::<Identity>(&ctx).await, Status::Updated);
    let identity: Identity = cached(&ctx, &added).await;
    assert_eq!(identity.email, "work@example.com");

    sync::<Email>(&ctx).await;
    let gone = state.store().await.emails()[0].id.clone();
    state.store().await.destroy_email(&gone);
    assert_eq!(sync::<Email>(&ctx).await, Status::Updated);
    let lookup = gone.clone();
    assert!(ctx.cache(move |c| c.get::<Email>(&lookup)).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_state_invalidates_the_type() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    sync::<Mailbox>(&ctx).await;
    sync::<Email>(&ctx).await;

    state.store().await.fail_changes(EntityType::Mailbox);

    assert_eq!(sync::<Mailbox>(&ctx).await, Status::HasMore);
    assert!(ctx.cache(|c| c.state::<Mailbox>()).await.unwrap().is_none());
    assert!(ctx.cache(|c| c.get_all::<Mailbox>()).await.unwrap().is_empty());
    // Other types are untouched.
    assert!(ctx.cache(|c| c.state::<Email>()).await.unwrap().is_some());

    // The next pass reloads from scratch.
    assert_eq!(sync::<Mailbox>(&ctx).await, Status::Updated);
    assert_eq!(ctx.cache(|c| c.get_all::<Mailbox>()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn objects_sync_skips_unloaded_emails_and_threads() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;

    let mut batch = BatchBuilder::new();
    ObjectsSync::plan(&mut batch, "a1", &ObjectsState::default()).unwrap();
    let batch = batch.build();
    assert_eq!(batch.invocations().len(), 1);
    assert_eq!(batch.invocations()[0].call.name().to_string(), "Mailbox/get");

    sync::<Mailbox>(&ctx).await;
    sync::<Email>(&ctx).await;
    let objects = ctx.cache(|c| c.objects_state()).await.unwrap();
    let mut batch = BatchBuilder::new();
    ObjectsSync::plan(&mut batch, "a1", &objects).unwrap();
    let names: Vec<String> = batch
        .build()
        .invocations()
        .iter()
        .map(|i| i.call.name().to_string())
        .collect();
    assert_eq!(
        names,
        ["Mailbox/changes", "Mailbox/get", "Mailbox/get", "Email/changes", "Email/get", "Email/get"]
    );
}

#[tokio::test]
async fn objects_sync_merges_statuses() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    sync::<Mailbox>(&ctx).await;
    sync::<Email>(&ctx).await;
    sync::<Thread>(&ctx).await;

    let email = state.store().await.emails()[0].id.clone();
    state.store().await.set_keyword(&email, "$flagged", true);

    let objects = ctx.cache(|c| c.objects_state()).await.unwrap();
    let mut batch = BatchBuilder::new();
    let plan = ObjectsSync::plan(&mut batch, "a1", &objects).unwrap();
    let responses = ctx.send(&batch.build()).await.unwrap();
    assert_eq!(plan.apply(&ctx, &responses).await.unwrap(), Status::Updated);

    let after = ctx.cache(|c| c.objects_state()).await.unwrap();
    assert_ne!(after.email_state, objects.email_state);
    assert_eq!(after.thread_state, objects.thread_state);
}

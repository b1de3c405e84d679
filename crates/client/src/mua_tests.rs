// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use mua_core::entity::{DRAFT, FLAGGED, SEEN};
use mua_core::{EmailQuery, MethodErrorType, Role, SqliteCache, Status};
use mua_remote::{MailStore, NewEmail, ServerState};

use crate::test_helpers::{client_for, demo_client, LocalTransport};
use crate::Error;

use super::Mua;

type TestMua = Mua<SqliteCache, LocalTransport>;

/// Loads the unfiltered query and returns its thread ids, newest first.
async fn loaded(mua: &TestMua) -> Vec<String> {
    let query = EmailQuery::unfiltered();
    mua.query(&query).await.unwrap();
    mua.query_items(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.thread_id)
        .collect()
}

async fn inbox_unread(mua: &TestMua) -> u64 {
    mua.mailboxes()
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.role == Some(Role::Inbox))
        .unwrap()
        .unread_emails
}

async fn requests_sent(mua: &TestMua) -> usize {
    mua.transport().sent().lock().unwrap().len()
}

async fn server_email_ids(state: &ServerState, subject: &str) -> Vec<String> {
    state
        .store()
        .await
        .emails()
        .into_iter()
        .filter(|e| e.subject.as_deref() == Some(subject))
        .map(|e| e.id)
        .collect()
}

#[tokio::test]
async fn query_refresh_and_mark_read() {
    let (state, mua) = demo_client(None).await;

    let query = EmailQuery::unfiltered();
    assert_eq!(mua.query(&query).await.unwrap(), Status::Updated);
    let items = mua.query_items(&query).await.unwrap();
    assert_eq!(items.len(), 5);

    assert_eq!(mua.refresh().await.unwrap(), Status::Unchanged);
    assert_eq!(inbox_unread(&mua).await, 4);

    let newest = items[0].thread_id.clone();
    assert_eq!(mua.mark_read(&newest).await.unwrap(), Status::Updated);
    assert_eq!(inbox_unread(&mua).await, 3);
    assert_eq!(mua.refresh().await.unwrap(), Status::Unchanged);

    let id = &server_email_ids(&state, "Thread 5").await[0];
    assert!(state.store().await.email(id).unwrap().has_keyword(SEEN));
    assert!(mua.email(id).await.unwrap().unwrap().has_keyword(SEEN));
}

#[tokio::test]
async fn keyword_already_set_sends_nothing() {
    let (_state, mua) = demo_client(None).await;
    let threads = loaded(&mua).await;
    let before = requests_sent(&mua).await;

    // Thread 4 is archived and already read.
    assert_eq!(mua.mark_read(&threads[1]).await.unwrap(), Status::Unchanged);
    assert_eq!(mua.unflag(&threads[1]).await.unwrap(), Status::Unchanged);
    assert_eq!(requests_sent(&mua).await, before);
}

#[tokio::test]
async fn flag_applies_to_every_email_of_a_thread() {
    let (state, mua) = demo_client(None).await;
    let threads = loaded(&mua).await;
    let first = threads.last().unwrap();

    assert_eq!(mua.flag(first).await.unwrap(), Status::Updated);
    let thread = mua.thread(first).await.unwrap().unwrap();
    assert_eq!(thread.email_ids.len(), 2);
    for id in &thread.email_ids {
        assert!(state.store().await.email(id).unwrap().has_keyword(FLAGGED));
        assert!(mua.email(id).await.unwrap().unwrap().has_keyword(FLAGGED));
    }

    assert_eq!(mua.set_keyword(first, FLAGGED).await.unwrap(), Status::Unchanged);
    assert_eq!(mua.unflag(first).await.unwrap(), Status::Updated);
    for id in &thread.email_ids {
        assert!(!state.store().await.email(id).unwrap().has_keyword(FLAGGED));
    }
}

#[tokio::test]
async fn archive_moves_out_of_the_inbox() {
    let (state, mua) = demo_client(None).await;
    let threads = loaded(&mua).await;

    assert_eq!(mua.archive(&threads[0]).await.unwrap(), Status::Updated);

    let store = state.store().await;
    let inbox = store.mailbox_by_role(Role::Inbox).unwrap().id;
    let archive = store.mailbox_by_role(Role::Archive).unwrap().id;
    drop(store);
    let id = &server_email_ids(&state, "Thread 5").await[0];
    let email = mua.email(id).await.unwrap().unwrap();
    assert!(email.in_mailbox(&archive));
    assert!(!email.in_mailbox(&inbox));

    assert_eq!(mua.archive(&threads[0]).await.unwrap(), Status::Unchanged);
    assert_eq!(mua.move_to_inbox(&threads[0]).await.unwrap(), Status::Updated);
    let email = state.store().await.email(id).unwrap();
    assert!(email.in_mailbox(&inbox));
    assert!(!email.in_mailbox(&archive));
}

#[tokio::test]
async fn trash_is_created_in_the_same_request() {
    let (state, mua) = demo_client(None).await;
    let threads = loaded(&mua).await;
    let before = requests_sent(&mua).await;

    assert_eq!(mua.move_to_trash(&threads[0]).await.unwrap(), Status::Updated);
    assert_eq!(requests_sent(&mua).await, before + 1);

    let sent = mua.transport().sent();
    let request = sent.lock().unwrap().last().cloned().unwrap();
    let names: Vec<&str> = request.method_calls.iter().map(|c| c.name()).collect();
    assert_eq!(&names[..2], &["Mailbox/set", "Email/set"]);

    let trash = state.store().await.mailbox_by_role(Role::Trash).unwrap();
    assert_eq!(trash.name, "Trash");
    let cached = mua.mailboxes().await.unwrap();
    assert!(cached.iter().any(|m| m.id == trash.id));
    let id = &server_email_ids(&state, "Thread 5").await[0];
    let email = mua.email(id).await.unwrap().unwrap();
    assert_eq!(email.mailbox_ids.keys().collect::<Vec<_>>(), vec![&trash.id]);
}

#[tokio::test]
async fn stale_state_is_rejected_and_cache_catches_up() {
    let (state, mua) = demo_client(None).await;
    let threads = loaded(&mua).await;

    let other = server_email_ids(&state, "Thread 3").await.remove(0);
    state.store().await.set_keyword(&other, FLAGGED, true);

    let err = mua.mark_read(&threads[0]).await.unwrap_err();
    let kind = err.method_error().map(|e| e.kind);
    assert_eq!(kind, Some(MethodErrorType::StateMismatch));
    assert!(mua.email(&other).await.unwrap().unwrap().has_keyword(FLAGGED));

    assert_eq!(mua.mark_read(&threads[0]).await.unwrap(), Status::Updated);
}

#[tokio::test]
async fn submit_files_the_draft_under_sent() {
    let mut store = MailStore::demo("a1");
    let drafts = store.add_mailbox("Drafts", Some(Role::Drafts));
    let draft = store.add_email(NewEmail::new(drafts.clone(), "Hello").keyword(DRAFT));
    let identity = store.identities()[0].id.clone();
    let (state, mua) = client_for(store, None).await;
    loaded(&mua).await;

    assert_eq!(mua.submit(&draft, &identity).await.unwrap(), Status::Updated);

    let store = state.store().await;
    let sent = store.mailbox_by_role(Role::Sent).unwrap().id;
    let email = store.email(&draft).unwrap();
    assert!(!email.has_keyword(DRAFT));
    assert!(!email.in_mailbox(&drafts));
    assert!(email.in_mailbox(&sent));
    assert_eq!(store.submissions().len(), 1);
    drop(store);

    let cached = mua.email(&draft).await.unwrap().unwrap();
    assert!(!cached.has_keyword(DRAFT));
    assert!(cached.in_mailbox(&sent));
}

#[tokio::test]
async fn unknown_thread_is_not_found() {
    let (_state, mua) = demo_client(None).await;
    let result = mua.archive("T-unknown").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn identities_load_on_demand() {
    let (_state, mua) = demo_client(None).await;
    assert!(mua.identities().await.unwrap().is_empty());
    assert_eq!(mua.refresh_identities().await.unwrap(), Status::Updated);
    let identities = mua.identities().await.unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].email, "demo@example.com");
    assert_eq!(mua.refresh_identities().await.unwrap(), Status::Unchanged);
}

#[tokio::test]
async fn refresh_before_any_query_loads_mailboxes_only() {
    let (_state, mua) = demo_client(None).await;
    assert_eq!(mua.refresh().await.unwrap(), Status::Updated);
    assert_eq!(mua.mailboxes().await.unwrap().len(), 2);
    assert!(mua.query_items(&EmailQuery::unfiltered()).await.unwrap().is_empty());
    assert_eq!(mua.fetch_missing(&EmailQuery::unfiltered()).await.unwrap(), Status::Unchanged);
}

#[tokio::test]
async fn flag_on_an_uncached_email_keeps_cached_ones() {
    let (state, mua) = demo_client(Some(2)).await;
    let threads = loaded(&mua).await;
    assert_eq!(threads.len(), 2);
    let held = server_email_ids(&state, "Thread 5").await.remove(0);
    let elsewhere = server_email_ids(&state, "Thread 1").await.remove(0);
    assert!(mua.email(&elsewhere).await.unwrap().is_none());

    state.store().await.set_keyword(&elsewhere, FLAGGED, true);

    assert_eq!(mua.refresh().await.unwrap(), Status::Updated);
    assert!(mua.email(&held).await.unwrap().is_some());
    assert!(mua.email(&elsewhere).await.unwrap().is_none());
    assert_eq!(mua.refresh().await.unwrap(), Status::Unchanged);
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use mua_core::{Mailbox, QueryItem, Request, Response, Role, SqliteCache, StateToken};
use mua_remote::{MailStore, NewEmail, ServerState};

use super::*;
use crate::sync::SyncOptions;
use crate::test_helpers::{context, LocalTransport};
use crate::transport::TransportResult;
use crate::worker::CacheWorker;

type TestContext = Context<SqliteCache, LocalTransport>;

async fn items(ctx: &TestContext, query: &EmailQuery) -> Vec<QueryItem> {
    let key = query.fingerprint().unwrap();
    ctx.cache(move |c| c.query_items(&key)).await.unwrap()
}

async fn missing(ctx: &TestContext, query: &EmailQuery) -> usize {
    let key = query.fingerprint().unwrap();
    ctx.cache(move |c| c.missing(&key))
        .await
        .unwrap()
        .thread_ids
        .len()
}

async fn inbox(state: &ServerState) -> Mailbox {
    state.store().await.mailbox_by_role(Role::Inbox).unwrap()
}

#[tokio::test]
async fn initial_query_loads_list_and_objects() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    let all = EmailQuery::unfiltered();

    assert_eq!(query(&ctx, &all).await.unwrap(), Status::Updated);

    let items = items(&ctx, &all).await;
    assert_eq!(items.len(), 5);
    let subjects: Vec<Option<String>> = {
        let mut out = Vec::new();
        for item in &items {
            let id = item.email_id.clone();
            let email = ctx.cache(move |c| c.get::<Email>(&id)).await.unwrap().unwrap();
            out.push(email.subject);
        }
        out
    };
    assert_eq!(subjects[0].as_deref(), Some("Thread 5"));
    assert_eq!(subjects[4].as_deref(), Some("Re: Thread 1"));
    assert_eq!(missing(&ctx, &all).await, 0);

    // Both emails of the first thread were backfilled.
    let threads = ctx.cache(|c| c.get_all::<Thread>()).await.unwrap();
    assert_eq!(threads.len(), 5);
    assert_eq!(ctx.cache(|c| c.get_all::<Email>()).await.unwrap().len(), 6);
}

#[tokio::test]
async fn requery_without_changes_is_unchanged() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    let all = EmailQuery::unfiltered();
    query(&ctx, &all).await.unwrap();
    let before = items(&ctx, &all).await;

    assert_eq!(query(&ctx, &all).await.unwrap(), Status::Unchanged);
    assert_eq!(query(&ctx, &all).await.unwrap(), Status::Unchanged);
    assert_eq!(items(&ctx, &all).await, before);
}

#[tokio::test]
async fn new_mail_is_inserted_by_refresh() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    let inbox = inbox(&state).await;
    let in_inbox = EmailQuery::in_mailbox(inbox.id.clone());
    query(&ctx, &in_inbox).await.unwrap();
    assert_eq!(items(&ctx, &in_inbox).await.len(), 3);

    let arrived = state
        .store()
        .await
        .add_email(NewEmail::new(inbox.id.clone(), "Fresh"));

    assert_eq!(query(&ctx, &in_inbox).await.unwrap(), Status::Updated);
    let items = items(&ctx, &in_inbox).await;
    assert_eq!(items.len(), 4);
    assert_eq!(items[0].email_id, arrived);
    assert_eq!(missing(&ctx, &in_inbox).await, 0);
}

#[tokio::test]
async fn moved_mail_is_removed_by_refresh() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    let inbox = inbox(&state).await;
    let archive = state.store().await.mailbox_by_role(Role::Archive).unwrap();
    let in_inbox = EmailQuery::in_mailbox(inbox.id.clone());
    query(&ctx, &in_inbox).await.unwrap();

    let first = items(&ctx, &in_inbox).await[0].email_id.clone();
    state.store().await.move_email(&first, &inbox.id, &archive.id);

    assert_eq!(query(&ctx, &in_inbox).await.unwrap(), Status::Updated);
    let items = items(&ctx, &in_inbox).await;
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.email_id != first));
}

#[tokio::test]
async fn failed_query_changes_invalidate_only_that_query() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    let all = EmailQuery::unfiltered();
    let in_inbox = EmailQuery::in_mailbox(inbox(&state).await.id);
    query(&ctx, &all).await.unwrap();
    query(&ctx, &in_inbox).await.unwrap();

    state.store().await.fail_query_changes();

    assert_eq!(query(&ctx, &all).await.unwrap(), Status::HasMore);
    assert!(items(&ctx, &all).await.is_empty());
    assert_eq!(items(&ctx, &in_inbox).await.len(), 3);
    assert_eq!(ctx.cache(|c| c.get_all::<Email>()).await.unwrap().len(), 6);

    // The next call starts over from position 0.
    assert_eq!(query(&ctx, &all).await.unwrap(), Status::Updated);
    assert_eq!(items(&ctx, &all).await.len(), 5);
}

#[tokio::test]
async fn pages_are_appended_after_the_tail() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, Some(2)).await;
    let all = EmailQuery::unfiltered();

    assert_eq!(query(&ctx, &all).await.unwrap(), Status::Updated);
    assert_eq!(items(&ctx, &all).await.len(), 2);

    assert_eq!(query_page(&ctx, &all).await.unwrap(), Status::Updated);
    assert_eq!(items(&ctx, &all).await.len(), 4);

    assert_eq!(query_page(&ctx, &all).await.unwrap(), Status::Updated);
    assert_eq!(items(&ctx, &all).await.len(), 5);

    // Past the end there is nothing to add.
    assert_eq!(query_page(&ctx, &all).await.unwrap(), Status::Unchanged);
    assert_eq!(items(&ctx, &all).await.len(), 5);
    assert_eq!(missing(&ctx, &all).await, 0);
}

#[tokio::test]
async fn paging_an_unknown_query_loads_the_first_page() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, Some(3)).await;
    let all = EmailQuery::unfiltered();

    assert_eq!(query_page(&ctx, &all).await.unwrap(), Status::Updated);
    assert_eq!(items(&ctx, &all).await.len(), 3);
}

#[tokio::test]
async fn server_maximum_caps_the_page() {
    let mut store = MailStore::demo("a1");
    store.set_max_objects_in_get(Some(2));
    let state = ServerState::new(store);
    let ctx = context(&state, Some(50)).await;
    let all = EmailQuery::unfiltered();

    query(&ctx, &all).await.unwrap();
    assert_eq!(items(&ctx, &all).await.len(), 2);
}

#[tokio::test]
async fn stale_anchor_invalidates_an_unchanged_query() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, Some(2)).await;
    let all = EmailQuery::unfiltered();
    query(&ctx, &all).await.unwrap();

    state.store().await.fail_anchor();

    assert_eq!(query_page(&ctx, &all).await.unwrap(), Status::HasMore);
    assert!(items(&ctx, &all).await.is_empty());
}

#[tokio::test]
async fn stale_anchor_after_changes_keeps_the_query() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, Some(2)).await;
    let all = EmailQuery::unfiltered();
    query(&ctx, &all).await.unwrap();

    let inbox = inbox(&state).await;
    state
        .store()
        .await
        .add_email(NewEmail::new(inbox.id, "Fresh"));
    state.store().await.fail_anchor();

    assert_eq!(query_page(&ctx, &all).await.unwrap(), Status::HasMore);
    assert!(!items(&ctx, &all).await.is_empty());
}

#[tokio::test]
async fn fetch_missing_without_gaps_is_unchanged() {
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = context(&state, None).await;
    let all = EmailQuery::unfiltered();
    query(&ctx, &all).await.unwrap();

    let key = all.fingerprint().unwrap();
    assert_eq!(fetch_missing(&ctx, &key).await.unwrap(), Status::Unchanged);
}

#[tokio::test]
async fn large_threads_are_fetched_within_the_server_maximum() {
    let mut store = MailStore::demo("a1");
    let inbox = store.mailbox_by_role(Role::Inbox).unwrap().id;
    let first = store.add_email(NewEmail::new(inbox.clone(), "Big"));
    let thread_id = store.email(&first).unwrap().thread_id;
    for n in 0..2 {
        store.add_email(NewEmail::new(inbox.clone(), format!("Re: Big {n}")).in_thread(thread_id.clone()));
    }
    store.set_max_objects_in_get(Some(2));
    let state = ServerState::new(store);
    let ctx = context(&state, None).await;
    let all = EmailQuery::unfiltered();

    assert_eq!(query(&ctx, &all).await.unwrap(), Status::Updated);
    assert_eq!(items(&ctx, &all).await.len(), 2);
    assert_eq!(missing(&ctx, &all).await, 0);
    let lookup = thread_id.clone();
    let thread = ctx.cache(move |c| c.get::<Thread>(&lookup)).await.unwrap().unwrap();
    assert_eq!(thread.email_ids.len(), 3);
    for id in thread.email_ids {
        assert!(ctx.cache(move |c| c.get::<Email>(&id)).await.unwrap().is_some());
    }

    for request in ctx.transport.sent().lock().unwrap().iter() {
        for call in &request.method_calls {
            let ids = call.arguments()["ids"].as_array().map_or(0, Vec::len);
            assert!(ids <= 2, "{} asked for {} ids", call.name(), ids);
        }
    }
    assert_eq!(query(&ctx, &all).await.unwrap(), Status::Unchanged);
}

/// Moves the cached email state through a second connection whenever
/// threads are requested.
struct Racing {
    inner: LocalTransport,
    path: PathBuf,
}

impl Transport for Racing {
    fn connect(
        &mut self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        self.inner.connect(url)
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        self.inner.disconnect()
    }

    fn execute(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Response>> + Send + '_>> {
        if request.method_calls.iter().any(|c| c.name() == "Thread/get") {
            let mut other = SqliteCache::open(&self.path).unwrap();
            other
                .add_entities::<Email>(&StateToken::new("elsewhere"), &[])
                .unwrap();
        }
        self.inner.execute(request)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

#[tokio::test]
async fn backfill_that_loses_a_race_has_more() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let state = ServerState::new(MailStore::demo("a1"));
    let ctx = Context {
        session: state.session().await,
        transport: Racing {
            inner: LocalTransport::new(state.clone()),
            path: path.clone(),
        },
        worker: CacheWorker::spawn(SqliteCache::open(&path).unwrap()).unwrap(),
        options: SyncOptions::default(),
    };
    let all = EmailQuery::unfiltered();

    assert_eq!(query(&ctx, &all).await.unwrap(), Status::HasMore);
    assert_eq!(ctx.cache(|c| c.get_all::<Thread>()).await.unwrap().len(), 5);
    assert!(ctx.cache(|c| c.get_all::<Email>()).await.unwrap().is_empty());
}

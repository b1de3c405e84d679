// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use mua_core::entity::FLAGGED;

fn store_with_inbox() -> (MailStore, String) {
    let mut store = MailStore::new("a1");
    let inbox = store.add_mailbox("Inbox", Some(Role::Inbox));
    (store, inbox)
}

#[test]
fn new_store_starts_at_state_zero() {
    let store = MailStore::new("a1");
    for entity in EntityType::ALL {
        assert_eq!(store.state(entity), "0");
    }
    let changes = store.changes_since(EntityType::Email, 0, None).unwrap();
    assert_eq!(changes, ChangesSince::default());
}

#[test]
fn adding_email_creates_thread_and_moves_counters() {
    let (mut store, inbox) = store_with_inbox();
    let id = store.add_email(NewEmail::new(inbox.clone(), "hello"));

    assert_eq!(store.state(EntityType::Email), "1");
    assert_eq!(store.state(EntityType::Thread), "1");
    assert_eq!(store.state(EntityType::Mailbox), "2");

    let email = store.email(&id).unwrap();
    let thread = store.thread(&email.thread_id).unwrap();
    assert_eq!(thread.email_ids, vec![id.clone()]);

    let mailbox = store.mailbox(&inbox).unwrap();
    assert_eq!(mailbox.total_emails, 1);
    assert_eq!(mailbox.unread_emails, 1);
    assert_eq!(mailbox.unread_threads, 1);

    let changes = store.changes_since(EntityType::Mailbox, 1, None).unwrap();
    assert_eq!(changes.updated, vec![inbox]);
    assert!(changes.counters_only);
}

#[test]
fn keyword_change_leaves_threads_alone() {
    let (mut store, inbox) = store_with_inbox();
    let id = store.add_email(NewEmail::new(inbox, "hello"));
    let thread_state = store.state(EntityType::Thread);

    assert!(store.mark_read(&id));
    assert_eq!(store.state(EntityType::Thread), thread_state);
    assert_eq!(store.state(EntityType::Email), "2");
    assert!(store.email(&id).unwrap().has_keyword(SEEN));

    // Flagging moves no counter
    let mailbox_state = store.state(EntityType::Mailbox);
    assert!(store.set_keyword(&id, FLAGGED, true));
    assert_eq!(store.state(EntityType::Mailbox), mailbox_state);
}

#[test]
fn reply_updates_existing_thread() {
    let (mut store, inbox) = store_with_inbox();
    let first = store.add_email(NewEmail::new(inbox.clone(), "hello"));
    let thread_id = store.email(&first).unwrap().thread_id;

    store.add_email(NewEmail::new(inbox, "re: hello").in_thread(thread_id.clone()));

    let changes = store.changes_since(EntityType::Thread, 1, None).unwrap();
    assert_eq!(changes.updated, vec![thread_id.clone()]);
    assert_eq!(store.thread(&thread_id).unwrap().email_ids.len(), 2);
}

#[test]
fn rename_is_not_counters_only() {
    let (mut store, inbox) = store_with_inbox();
    let since = store.state_number(EntityType::Mailbox);
    assert!(store.rename_mailbox(&inbox, "In"));

    let changes = store.changes_since(EntityType::Mailbox, since, None).unwrap();
    assert_eq!(changes.updated, vec![inbox]);
    assert!(!changes.counters_only);
}

#[test]
fn created_then_destroyed_nets_out() {
    let (mut store, inbox) = store_with_inbox();
    let id = store.add_email(NewEmail::new(inbox, "hello"));
    assert!(store.destroy_email(&id));

    let changes = store.changes_since(EntityType::Email, 0, None).unwrap();
    assert!(changes.created.is_empty());
    assert!(changes.destroyed.is_empty());
    assert_eq!(changes.new_state, 2);
}

#[test]
fn max_changes_stops_at_complete_state() {
    let mut store = MailStore::new("a1");
    for name in ["a", "b", "c"] {
        store.add_mailbox(name, None);
    }

    let first = store.changes_since(EntityType::Mailbox, 0, Some(2)).unwrap();
    assert_eq!(first.created.len(), 2);
    assert_eq!(first.new_state, 2);
    assert!(first.has_more);

    let rest = store
        .changes_since(EntityType::Mailbox, first.new_state, Some(2))
        .unwrap();
    assert_eq!(rest.created.len(), 1);
    assert!(!rest.has_more);
}

#[test]
fn unknown_state_has_no_changes() {
    let store = MailStore::new("a1");
    assert!(store.changes_since(EntityType::Email, 7, None).is_none());
}

#[test]
fn snapshots_follow_email_states() {
    let (mut store, inbox) = store_with_inbox();
    let id = store.add_email(NewEmail::new(inbox, "hello"));
    store.mark_read(&id);

    assert!(store.snapshot(0).unwrap().is_empty());
    assert!(!store.snapshot(1).unwrap()[&id].has_keyword(SEEN));
    assert!(store.snapshot(2).unwrap()[&id].has_keyword(SEEN));
}

#[test]
fn demo_account_layout() {
    let store = MailStore::demo("a1");
    assert_eq!(store.threads().len(), 5);
    assert_eq!(store.emails().len(), 6);
    assert_eq!(store.identities().len(), 1);

    let inbox = store.mailbox_by_role(Role::Inbox).unwrap();
    assert_eq!(inbox.total_emails, 4);
    assert_eq!(inbox.total_threads, 3);
    assert_eq!(inbox.unread_threads, 3);

    let archive = store.mailbox_by_role(Role::Archive).unwrap();
    assert_eq!(archive.total_threads, 2);
    assert_eq!(archive.unread_emails, 0);
}

#[test]
fn faults_fire_once() {
    let mut store = MailStore::new("a1");
    store.fail_changes(EntityType::Email);
    store.fail_anchor();

    assert!(store.take_changes_fault(EntityType::Email));
    assert!(!store.take_changes_fault(EntityType::Email));
    assert!(store.take_anchor_fault());
    assert!(!store.take_anchor_fault());
    assert!(!store.take_query_changes_fault());
}

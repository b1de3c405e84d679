// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    email = { EntityType::Email, "Email", Namespace::Mail },
    mailbox = { EntityType::Mailbox, "Mailbox", Namespace::Mail },
    thread = { EntityType::Thread, "Thread", Namespace::Mail },
    identity = { EntityType::Identity, "Identity", Namespace::Submission },
    submission = { EntityType::EmailSubmission, "EmailSubmission", Namespace::Submission },
)]
fn entity_type_names(entity: EntityType, name: &str, namespace: Namespace) {
    assert_eq!(entity.as_str(), name);
    assert_eq!(entity.to_string(), name);
    assert_eq!(name.parse::<EntityType>().unwrap(), entity);
    assert_eq!(entity.namespace(), namespace);
}

#[test]
fn entity_type_rejects_unknown() {
    assert!("Calendar".parse::<EntityType>().is_err());
}

#[test]
fn refresh_order_puts_mailbox_before_email_before_thread() {
    let pos = |t| EntityType::ALL.iter().position(|e| *e == t).unwrap();
    assert!(pos(EntityType::Mailbox) < pos(EntityType::Email));
    assert!(pos(EntityType::Email) < pos(EntityType::Thread));
}

#[parameterized(
    inbox = { Role::Inbox, "inbox" },
    archive = { Role::Archive, "archive" },
    trash = { Role::Trash, "trash" },
    sent = { Role::Sent, "sent" },
    all = { Role::All, "all" },
)]
fn role_round_trips_through_str(role: Role, s: &str) {
    assert_eq!(role.as_str(), s);
    assert_eq!(s.parse::<Role>().unwrap(), role);
    assert_eq!(serde_json::to_value(role).unwrap(), serde_json::json!(s));
}

#[test]
fn partial_email_decodes_with_defaults() {
    let email: Email = serde_json::from_value(serde_json::json!({
        "id": "M1",
        "threadId": "T1",
    }))
    .unwrap();
    assert_eq!(email.thread_id, "T1");
    assert!(email.keywords.is_empty());
    assert!(email.mailbox_ids.is_empty());
    assert!(email.subject.is_none());
}

#[test]
fn email_keyword_and_mailbox_membership() {
    let email: Email = serde_json::from_value(serde_json::json!({
        "id": "M1",
        "threadId": "T1",
        "mailboxIds": { "inbox": true },
        "keywords": { "$seen": true, "$flagged": false },
    }))
    .unwrap();
    assert!(email.has_keyword(SEEN));
    assert!(!email.has_keyword(FLAGGED));
    assert!(!email.has_keyword(DRAFT));
    assert!(email.in_mailbox("inbox"));
    assert!(!email.in_mailbox("archive"));
}

#[test]
fn mailbox_serializes_camel_case_counters() {
    let mailbox = Mailbox {
        id: "mb1".into(),
        name: "Inbox".into(),
        parent_id: None,
        role: Some(Role::Inbox),
        sort_order: 1,
        total_emails: 3,
        unread_emails: 2,
        total_threads: 3,
        unread_threads: 2,
    };
    let value = serde_json::to_value(&mailbox).unwrap();
    for counter in MAILBOX_COUNTERS {
        assert!(value.get(counter).is_some(), "missing {counter}");
    }
    assert_eq!(value["role"], "inbox");
}

#[test]
fn mutable_property_masks() {
    assert_eq!(Mailbox::MUTABLE, PropertyMask::Reported);
    assert_eq!(
        Email::MUTABLE,
        PropertyMask::Fixed(&["keywords", "mailboxIds"])
    );
    assert_eq!(Thread::MUTABLE, PropertyMask::All);
    assert_eq!(Identity::MUTABLE, PropertyMask::All);
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory mail account with per-type change logs.
//!
//! Every mutation runs between [`MailStore::begin`] and [`MailStore::commit`]:
//! the stored objects are changed directly, then `commit` records one state
//! step per touched entity type and diffs the derived views (threads and
//! mailbox counters) to record the Thread and Mailbox changes they imply.
//! State tokens are decimal counters starting at `0`.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, TimeZone, Utc};
use mua_core::entity::{Email, EmailSubmission, EntityType, Identity, Mailbox, Role, Thread, SEEN};
use mua_core::Session;

/// Kind of change recorded for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Destroyed,
}

#[derive(Debug, Clone)]
struct Change {
    state: u64,
    id: String,
    kind: ChangeKind,
    /// Only mailbox counters changed.
    counters_only: bool,
}

/// Net changes between two states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangesSince {
    pub new_state: u64,
    pub has_more: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub destroyed: Vec<String>,
    /// True if every update in the window only touched mailbox counters.
    pub counters_only: bool,
}

#[derive(Debug, Clone, Default)]
struct ChangeLog {
    state: u64,
    entries: Vec<Change>,
}

impl ChangeLog {
    fn record(&mut self, changes: Vec<(String, ChangeKind, bool)>) {
        if changes.is_empty() {
            return;
        }
        self.state += 1;
        for (id, kind, counters_only) in changes {
            self.entries.push(Change {
                state: self.state,
                id,
                kind,
                counters_only,
            });
        }
    }

    /// Net changes after `since`, limited to `max_changes` ids when possible.
    ///
    /// Returns `None` for a state this log never issued.
    fn since(&self, since: u64, max_changes: Option<usize>) -> Option<ChangesSince> {
        if since > self.state {
            return None;
        }
        let window: Vec<&Change> = self.entries.iter().filter(|c| c.state > since).collect();

        let mut new_state = self.state;
        if let Some(max) = max_changes {
            let mut ids = HashSet::new();
            let mut last_complete = since;
            for state in (since + 1)..=self.state {
                for change in window.iter().filter(|c| c.state == state) {
                    ids.insert(change.id.as_str());
                }
                if ids.len() > max && last_complete > since {
                    break;
                }
                last_complete = state;
                if ids.len() >= max {
                    break;
                }
            }
            new_state = last_complete;
        }

        // id -> (first kind, last kind, counters only)
        let mut order: Vec<&str> = Vec::new();
        let mut net: BTreeMap<&str, (ChangeKind, ChangeKind, bool)> = BTreeMap::new();
        for change in window.iter().filter(|c| c.state <= new_state) {
            match net.get_mut(change.id.as_str()) {
                Some(entry) => {
                    entry.1 = change.kind;
                    entry.2 &= change.counters_only;
                }
                None => {
                    order.push(change.id.as_str());
                    net.insert(
                        change.id.as_str(),
                        (change.kind, change.kind, change.counters_only),
                    );
                }
            }
        }

        let mut result = ChangesSince {
            new_state,
            has_more: new_state < self.state,
            counters_only: true,
            ..ChangesSince::default()
        };
        for id in order {
            let Some(&(first, last, counters_only)) = net.get(id) else {
                continue;
            };
            match (first, last) {
                (ChangeKind::Created, ChangeKind::Destroyed) => {}
                (ChangeKind::Created, _) => result.created.push(id.to_string()),
                (_, ChangeKind::Destroyed) => result.destroyed.push(id.to_string()),
                _ => {
                    result.updated.push(id.to_string());
                    result.counters_only &= counters_only;
                }
            }
        }
        if !result.created.is_empty() || !result.destroyed.is_empty() || result.updated.is_empty() {
            result.counters_only = false;
        }
        Some(result)
    }
}

/// Injected failures. Each fires once.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub cannot_calculate_changes: HashSet<EntityType>,
    pub cannot_calculate_query_changes: bool,
    pub anchor_not_found: bool,
}

/// Mailbox counters, in [`mua_core::entity::MAILBOX_COUNTERS`] order.
type Counters = [u64; 4];

/// Views derived from the stored emails.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Derived {
    threads: BTreeMap<String, Vec<String>>,
    counters: BTreeMap<String, Counters>,
}

/// Changes touched by one mutation, per stored entity type.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    before: Option<Derived>,
    changes: BTreeMap<EntityType, Vec<(String, ChangeKind, bool)>>,
}

impl Pending {
    pub(crate) fn touch(&mut self, entity: EntityType, id: impl Into<String>, kind: ChangeKind) {
        self.changes
            .entry(entity)
            .or_default()
            .push((id.into(), kind, false));
    }
}

/// Fields of a new email.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub mailbox_ids: Vec<String>,
    pub subject: String,
    /// Joins an existing thread when set.
    pub thread_id: Option<String>,
    pub keywords: Vec<String>,
    pub received_at: DateTime<Utc>,
}

impl NewEmail {
    pub fn new(mailbox_id: impl Into<String>, subject: impl Into<String>) -> Self {
        NewEmail {
            mailbox_ids: vec![mailbox_id.into()],
            subject: subject.into(),
            thread_id: None,
            keywords: Vec::new(),
            received_at: Utc::now(),
        }
    }

    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

/// The account served by the mock server.
#[derive(Debug)]
pub struct MailStore {
    account_id: String,
    mailboxes: BTreeMap<String, Mailbox>,
    emails: BTreeMap<String, Email>,
    identities: BTreeMap<String, Identity>,
    submissions: BTreeMap<String, EmailSubmission>,
    logs: BTreeMap<EntityType, ChangeLog>,
    /// Emails as of each Email state, for query changes.
    snapshots: BTreeMap<u64, BTreeMap<String, Email>>,
    next_id: u64,
    max_objects_in_get: Option<usize>,
    pub faults: Faults,
}

impl MailStore {
    pub fn new(account_id: impl Into<String>) -> Self {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(0, BTreeMap::new());
        MailStore {
            account_id: account_id.into(),
            mailboxes: BTreeMap::new(),
            emails: BTreeMap::new(),
            identities: BTreeMap::new(),
            submissions: BTreeMap::new(),
            logs: EntityType::ALL
                .iter()
                .map(|t| (*t, ChangeLog::default()))
                .collect(),
            snapshots,
            next_id: 1,
            max_objects_in_get: None,
            faults: Faults::default(),
        }
    }

    /// An account with an Inbox and an Archive, five threads and one identity.
    ///
    /// Threads 1, 3 and 5 sit in the Inbox; 2 and 4 in the Archive. The first
    /// thread holds two emails, the others one. Emails of even threads are
    /// read.
    pub fn demo(account_id: impl Into<String>) -> Self {
        let mut store = MailStore::new(account_id);
        let inbox = store.add_mailbox("Inbox", Some(Role::Inbox));
        let archive = store.add_mailbox("Archive", Some(Role::Archive));
        store.add_identity("Demo User", "demo@example.com");

        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).single().unwrap_or_else(Utc::now);
        for n in 1..=5i64 {
            let mailbox = if n % 2 == 1 { &inbox } else { &archive };
            let mut email = NewEmail::new(mailbox.clone(), format!("Thread {n}"))
                .received_at(epoch + Duration::hours(n));
            if n % 2 == 0 {
                email = email.keyword(SEEN);
            }
            let id = store.add_email(email);
            if n == 1 {
                let thread_id = store.email(&id).map(|e| e.thread_id).unwrap_or_default();
                store.add_email(
                    NewEmail::new(inbox.clone(), "Re: Thread 1")
                        .in_thread(thread_id)
                        .received_at(epoch + Duration::minutes(90)),
                );
            }
        }
        store
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn session(&self) -> Session {
        Session::new(self.account_id.clone())
            .with_max_objects_in_get(self.max_objects_in_get.map(|m| m as u64))
    }

    pub fn max_objects_in_get(&self) -> Option<usize> {
        self.max_objects_in_get
    }

    pub fn set_max_objects_in_get(&mut self, max: Option<usize>) {
        self.max_objects_in_get = max;
    }

    pub(crate) fn fresh_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}{}", self.next_id);
        self.next_id += 1;
        id
    }

    /// Current state token of `entity`.
    pub fn state(&self, entity: EntityType) -> String {
        self.state_number(entity).to_string()
    }

    pub(crate) fn state_number(&self, entity: EntityType) -> u64 {
        self.logs.get(&entity).map(|l| l.state).unwrap_or(0)
    }

    pub(crate) fn changes_since(
        &self,
        entity: EntityType,
        since: u64,
        max_changes: Option<usize>,
    ) -> Option<ChangesSince> {
        self.logs.get(&entity)?.since(since, max_changes)
    }

    pub(crate) fn snapshot(&self, email_state: u64) -> Option<&BTreeMap<String, Email>> {
        self.snapshots.get(&email_state)
    }

    pub(crate) fn emails_map(&self) -> &BTreeMap<String, Email> {
        &self.emails
    }

    // Reads

    pub fn email(&self, id: &str) -> Option<Email> {
        self.emails.get(id).cloned()
    }

    pub fn emails(&self) -> Vec<Email> {
        self.emails.values().cloned().collect()
    }

    pub fn mailbox(&self, id: &str) -> Option<Mailbox> {
        let derived = self.derived();
        self.mailboxes
            .get(id)
            .map(|m| with_counters(m, derived.counters.get(id)))
    }

    pub fn mailboxes(&self) -> Vec<Mailbox> {
        let derived = self.derived();
        self.mailboxes
            .values()
            .map(|m| with_counters(m, derived.counters.get(&m.id)))
            .collect()
    }

    pub fn mailbox_by_role(&self, role: Role) -> Option<Mailbox> {
        let id = self
            .mailboxes
            .values()
            .find(|m| m.role == Some(role))
            .map(|m| m.id.clone())?;
        self.mailbox(&id)
    }

    pub fn thread(&self, id: &str) -> Option<Thread> {
        self.derived().threads.get(id).map(|email_ids| Thread {
            id: id.to_string(),
            email_ids: email_ids.clone(),
        })
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.derived()
            .threads
            .into_iter()
            .map(|(id, email_ids)| Thread { id, email_ids })
            .collect()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.identities.values().cloned().collect()
    }

    pub fn identity(&self, id: &str) -> Option<Identity> {
        self.identities.get(id).cloned()
    }

    pub fn submissions(&self) -> Vec<EmailSubmission> {
        self.submissions.values().cloned().collect()
    }

    pub fn submission(&self, id: &str) -> Option<EmailSubmission> {
        self.submissions.get(id).cloned()
    }

    // Mutation framing

    pub(crate) fn begin(&self) -> Pending {
        Pending {
            before: Some(self.derived()),
            changes: BTreeMap::new(),
        }
    }

    /// Records the changes of one mutation, plus the thread and counter
    /// changes it caused.
    pub(crate) fn commit(&mut self, mut pending: Pending) {
        let after = self.derived();
        if let Some(before) = pending.before.take() {
            let threads = diff_keys(&before.threads, &after.threads);
            if !threads.is_empty() {
                pending.changes.insert(EntityType::Thread, threads);
            }
            for (id, counters) in &after.counters {
                let changed = before.counters.get(id).is_some_and(|old| old != counters);
                if changed {
                    pending
                        .changes
                        .entry(EntityType::Mailbox)
                        .or_default()
                        .push((id.clone(), ChangeKind::Updated, true));
                }
            }
        }

        let email_changed = pending.changes.contains_key(&EntityType::Email);
        for (entity, changes) in pending.changes {
            if let Some(log) = self.logs.get_mut(&entity) {
                log.record(changes);
            }
        }
        if email_changed {
            let state = self.state_number(EntityType::Email);
            self.snapshots.insert(state, self.emails.clone());
        }
    }

    // Raw mutations, used inside begin/commit

    pub(crate) fn insert_mailbox(&mut self, pending: &mut Pending, mailbox: Mailbox) {
        pending.touch(EntityType::Mailbox, mailbox.id.clone(), ChangeKind::Created);
        self.mailboxes.insert(mailbox.id.clone(), mailbox);
    }

    pub(crate) fn mailbox_mut(&mut self, pending: &mut Pending, id: &str) -> Option<&mut Mailbox> {
        let mailbox = self.mailboxes.get_mut(id)?;
        pending.touch(EntityType::Mailbox, id, ChangeKind::Updated);
        Some(mailbox)
    }

    pub(crate) fn remove_mailbox(&mut self, pending: &mut Pending, id: &str) -> Option<Mailbox> {
        let mailbox = self.mailboxes.remove(id)?;
        pending.touch(EntityType::Mailbox, id, ChangeKind::Destroyed);
        Some(mailbox)
    }

    pub(crate) fn has_mailbox(&self, id: &str) -> bool {
        self.mailboxes.contains_key(id)
    }

    pub(crate) fn mailbox_has_email(&self, id: &str) -> bool {
        self.emails.values().any(|e| e.in_mailbox(id))
    }

    pub(crate) fn insert_email(&mut self, pending: &mut Pending, email: Email) {
        pending.touch(EntityType::Email, email.id.clone(), ChangeKind::Created);
        self.emails.insert(email.id.clone(), email);
    }

    pub(crate) fn email_mut(&mut self, pending: &mut Pending, id: &str) -> Option<&mut Email> {
        let email = self.emails.get_mut(id)?;
        pending.touch(EntityType::Email, id, ChangeKind::Updated);
        Some(email)
    }

    pub(crate) fn remove_email(&mut self, pending: &mut Pending, id: &str) -> Option<Email> {
        let email = self.emails.remove(id)?;
        pending.touch(EntityType::Email, id, ChangeKind::Destroyed);
        Some(email)
    }

    pub(crate) fn insert_identity(&mut self, pending: &mut Pending, identity: Identity) {
        pending.touch(EntityType::Identity, identity.id.clone(), ChangeKind::Created);
        self.identities.insert(identity.id.clone(), identity);
    }

    pub(crate) fn remove_identity(&mut self, pending: &mut Pending, id: &str) -> Option<Identity> {
        let identity = self.identities.remove(id)?;
        pending.touch(EntityType::Identity, id, ChangeKind::Destroyed);
        Some(identity)
    }

    pub(crate) fn insert_submission(&mut self, pending: &mut Pending, submission: EmailSubmission) {
        pending.touch(
            EntityType::EmailSubmission,
            submission.id.clone(),
            ChangeKind::Created,
        );
        self.submissions.insert(submission.id.clone(), submission);
    }

    pub(crate) fn remove_submission(
        &mut self,
        pending: &mut Pending,
        id: &str,
    ) -> Option<EmailSubmission> {
        let submission = self.submissions.remove(id)?;
        pending.touch(EntityType::EmailSubmission, id, ChangeKind::Destroyed);
        Some(submission)
    }

    // Direct mutations, each its own state step

    pub fn add_mailbox(&mut self, name: &str, role: Option<Role>) -> String {
        let id = self.fresh_id("mb");
        let mut pending = self.begin();
        self.insert_mailbox(&mut pending, new_mailbox(id.clone(), name, role));
        self.commit(pending);
        id
    }

    pub fn add_identity(&mut self, name: &str, email: &str) -> String {
        let id = self.fresh_id("I");
        let mut pending = self.begin();
        self.insert_identity(
            &mut pending,
            Identity {
                id: id.clone(),
                name: name.to_string(),
                email: email.to_string(),
            },
        );
        self.commit(pending);
        id
    }

    pub fn add_email(&mut self, new: NewEmail) -> String {
        let id = self.fresh_id("M");
        let thread_id = match new.thread_id {
            Some(thread_id) => thread_id,
            None => self.fresh_id("T"),
        };
        let email = Email {
            id: id.clone(),
            thread_id,
            mailbox_ids: new.mailbox_ids.into_iter().map(|m| (m, true)).collect(),
            keywords: new.keywords.into_iter().map(|k| (k, true)).collect(),
            received_at: Some(new.received_at),
            subject: Some(new.subject.clone()),
            preview: Some(format!("Preview of {}", new.subject)),
            from: None,
        };
        let mut pending = self.begin();
        self.insert_email(&mut pending, email);
        self.commit(pending);
        id
    }

    /// Sets or clears a keyword. Returns false if the email does not exist.
    pub fn set_keyword(&mut self, email_id: &str, keyword: &str, value: bool) -> bool {
        let mut pending = self.begin();
        let Some(email) = self.email_mut(&mut pending, email_id) else {
            return false;
        };
        if value {
            email.keywords.insert(keyword.to_string(), true);
        } else {
            email.keywords.remove(keyword);
        }
        self.commit(pending);
        true
    }

    pub fn mark_read(&mut self, email_id: &str) -> bool {
        self.set_keyword(email_id, SEEN, true)
    }

    /// Moves an email between mailboxes.
    pub fn move_email(&mut self, email_id: &str, from: &str, to: &str) -> bool {
        let mut pending = self.begin();
        let Some(email) = self.email_mut(&mut pending, email_id) else {
            return false;
        };
        email.mailbox_ids.remove(from);
        email.mailbox_ids.insert(to.to_string(), true);
        self.commit(pending);
        true
    }

    pub fn destroy_email(&mut self, email_id: &str) -> bool {
        let mut pending = self.begin();
        if self.remove_email(&mut pending, email_id).is_none() {
            return false;
        }
        self.commit(pending);
        true
    }

    pub fn rename_mailbox(&mut self, mailbox_id: &str, name: &str) -> bool {
        let mut pending = self.begin();
        let Some(mailbox) = self.mailbox_mut(&mut pending, mailbox_id) else {
            return false;
        };
        mailbox.name = name.to_string();
        self.commit(pending);
        true
    }

    // Fault injection

    pub fn fail_changes(&mut self, entity: EntityType) {
        self.faults.cannot_calculate_changes.insert(entity);
    }

    pub fn fail_query_changes(&mut self) {
        self.faults.cannot_calculate_query_changes = true;
    }

    pub fn fail_anchor(&mut self) {
        self.faults.anchor_not_found = true;
    }

    pub(crate) fn take_changes_fault(&mut self, entity: EntityType) -> bool {
        self.faults.cannot_calculate_changes.remove(&entity)
    }

    pub(crate) fn take_query_changes_fault(&mut self) -> bool {
        std::mem::take(&mut self.faults.cannot_calculate_query_changes)
    }

    pub(crate) fn take_anchor_fault(&mut self) -> bool {
        std::mem::take(&mut self.faults.anchor_not_found)
    }

    // Derived views

    pub(crate) fn derived(&self) -> Derived {
        let mut by_thread: BTreeMap<String, Vec<&Email>> = BTreeMap::new();
        for email in self.emails.values() {
            by_thread.entry(email.thread_id.clone()).or_default().push(email);
        }
        let threads = by_thread
            .into_iter()
            .map(|(thread_id, mut emails)| {
                emails.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
                (thread_id, emails.into_iter().map(|e| e.id.clone()).collect())
            })
            .collect();

        let counters = self
            .mailboxes
            .keys()
            .map(|mailbox_id| (mailbox_id.clone(), self.count(mailbox_id)))
            .collect();

        Derived { threads, counters }
    }

    fn count(&self, mailbox_id: &str) -> Counters {
        let mut total_emails = 0;
        let mut unread_emails = 0;
        let mut threads = BTreeSet::new();
        let mut unread_threads = BTreeSet::new();
        for email in self.emails.values().filter(|e| e.in_mailbox(mailbox_id)) {
            total_emails += 1;
            threads.insert(email.thread_id.as_str());
            if !email.has_keyword(SEEN) {
                unread_emails += 1;
                unread_threads.insert(email.thread_id.as_str());
            }
        }
        [
            total_emails,
            unread_emails,
            threads.len() as u64,
            unread_threads.len() as u64,
        ]
    }
}

pub(crate) fn new_mailbox(id: String, name: &str, role: Option<Role>) -> Mailbox {
    Mailbox {
        id,
        name: name.to_string(),
        parent_id: None,
        role,
        sort_order: 0,
        total_emails: 0,
        unread_emails: 0,
        total_threads: 0,
        unread_threads: 0,
    }
}

fn with_counters(mailbox: &Mailbox, counters: Option<&Counters>) -> Mailbox {
    let [total_emails, unread_emails, total_threads, unread_threads] =
        counters.copied().unwrap_or_default();
    Mailbox {
        total_emails,
        unread_emails,
        total_threads,
        unread_threads,
        ..mailbox.clone()
    }
}

fn diff_keys(
    before: &BTreeMap<String, Vec<String>>,
    after: &BTreeMap<String, Vec<String>>,
) -> Vec<(String, ChangeKind, bool)> {
    let mut changes = Vec::new();
    for (id, value) in after {
        match before.get(id) {
            None => changes.push((id.clone(), ChangeKind::Created, false)),
            Some(old) if old != value => changes.push((id.clone(), ChangeKind::Updated, false)),
            Some(_) => {}
        }
    }
    for id in before.keys().filter(|id| !after.contains_key(*id)) {
        changes.push((id.clone(), ChangeKind::Destroyed, false));
    }
    changes
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Entity types mirrored by the local cache.
//!
//! The field sets are deliberately small: they carry what the sync engines
//! and the mutation helpers need (ids, membership, keywords, counters).
//! Every property other than `id` defaults when absent so that partial
//! objects (a Get restricted to `properties`) still decode.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::method::Namespace;

/// The fixed set of entity types the client knows how to synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Email,
    Mailbox,
    Thread,
    Identity,
    EmailSubmission,
}

impl EntityType {
    /// All entity types, in the order a full refresh requests them.
    pub const ALL: [EntityType; 5] = [
        EntityType::Identity,
        EntityType::Mailbox,
        EntityType::Email,
        EntityType::Thread,
        EntityType::EmailSubmission,
    ];

    /// The name used as the method prefix, e.g. `Email` in `Email/get`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Email => "Email",
            EntityType::Mailbox => "Mailbox",
            EntityType::Thread => "Thread",
            EntityType::Identity => "Identity",
            EntityType::EmailSubmission => "EmailSubmission",
        }
    }

    /// The capability a call on this type requires.
    pub fn namespace(&self) -> Namespace {
        match self {
            EntityType::Email | EntityType::Mailbox | EntityType::Thread => Namespace::Mail,
            EntityType::Identity | EntityType::EmailSubmission => Namespace::Submission,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Email" => Ok(EntityType::Email),
            "Mailbox" => Ok(EntityType::Mailbox),
            "Thread" => Ok(EntityType::Thread),
            "Identity" => Ok(EntityType::Identity),
            "EmailSubmission" => Ok(EntityType::EmailSubmission),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

/// Which properties a Get for updated objects should fetch, and therefore
/// which properties the cache may overwrite when applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyMask {
    /// Fetch and replace whole objects.
    All,
    /// Only these properties can change after creation.
    Fixed(&'static [&'static str]),
    /// Use the `updatedProperties` reported by the Changes response.
    Reported,
}

/// An object type that can be stored in the cache.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The entity type tag.
    const TYPE: EntityType;

    /// Properties refetched for objects reported as updated.
    const MUTABLE: PropertyMask = PropertyMask::All;

    /// The server-assigned id.
    fn id(&self) -> &str;
}

/// Well-known mailbox roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Inbox,
    Archive,
    Drafts,
    Sent,
    Trash,
    Junk,
    Important,
    All,
}

impl Role {
    /// Display name used when the client has to create the mailbox itself.
    pub fn default_name(&self) -> &'static str {
        match self {
            Role::Inbox => "Inbox",
            Role::Archive => "Archive",
            Role::Drafts => "Drafts",
            Role::Sent => "Sent",
            Role::Trash => "Trash",
            Role::Junk => "Junk",
            Role::Important => "Important",
            Role::All => "All Mail",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Inbox => "inbox",
            Role::Archive => "archive",
            Role::Drafts => "drafts",
            Role::Sent => "sent",
            Role::Trash => "trash",
            Role::Junk => "junk",
            Role::Important => "important",
            Role::All => "all",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(Role::Inbox),
            "archive" => Ok(Role::Archive),
            "drafts" => Ok(Role::Drafts),
            "sent" => Ok(Role::Sent),
            "trash" => Ok(Role::Trash),
            "junk" => Ok(Role::Junk),
            "important" => Ok(Role::Important),
            "all" => Ok(Role::All),
            other => Err(format!("unknown mailbox role '{other}'")),
        }
    }
}

/// Keyword marking an email as read.
pub const SEEN: &str = "$seen";
/// Keyword marking an email as flagged.
pub const FLAGGED: &str = "$flagged";
/// Keyword marking an email as a draft.
pub const DRAFT: &str = "$draft";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mailbox {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub sort_order: u32,
    #[serde(default)]
    pub total_emails: u64,
    #[serde(default)]
    pub unread_emails: u64,
    #[serde(default)]
    pub total_threads: u64,
    #[serde(default)]
    pub unread_threads: u64,
}

impl Entity for Mailbox {
    const TYPE: EntityType = EntityType::Mailbox;
    const MUTABLE: PropertyMask = PropertyMask::Reported;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Counter properties a server typically reports as the only Mailbox changes.
pub const MAILBOX_COUNTERS: [&str; 4] =
    ["totalEmails", "unreadEmails", "totalThreads", "unreadThreads"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub mailbox_ids: BTreeMap<String, bool>,
    #[serde(default)]
    pub keywords: BTreeMap<String, bool>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub from: Option<Vec<EmailAddress>>,
}

impl Email {
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.get(keyword).copied().unwrap_or(false)
    }

    pub fn in_mailbox(&self, mailbox_id: &str) -> bool {
        self.mailbox_ids.get(mailbox_id).copied().unwrap_or(false)
    }
}

impl Entity for Email {
    const TYPE: EntityType = EntityType::Email;
    const MUTABLE: PropertyMask = PropertyMask::Fixed(&["keywords", "mailboxIds"]);

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub email_ids: Vec<String>,
}

impl Entity for Thread {
    const TYPE: EntityType = EntityType::Thread;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl Entity for Identity {
    const TYPE: EntityType = EntityType::Identity;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSubmission {
    pub id: String,
    #[serde(default)]
    pub identity_id: String,
    #[serde(default)]
    pub email_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl Entity for EmailSubmission {
    const TYPE: EntityType = EntityType::EmailSubmission;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use mua_core::Role;

const QUICKSTART_HELP: &str = "\
Get started:
  mua refresh             Load mailboxes and identities
  mua list                List the inbox
  mua list --more         Load the next page
  mua read <thread>       Mark a thread as read";

#[derive(Parser, Debug)]
#[command(name = "mua")]
#[command(about = "A mail client that keeps a local mirror of one account")]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Configuration file (default: <config_dir>/mua/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Mailboxes addressable by role on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MailboxArg {
    #[default]
    Inbox,
    Archive,
    Sent,
    Drafts,
    Trash,
    /// Every email, regardless of mailbox
    All,
}

impl MailboxArg {
    pub fn role(&self) -> Option<Role> {
        match self {
            MailboxArg::Inbox => Some(Role::Inbox),
            MailboxArg::Archive => Some(Role::Archive),
            MailboxArg::Sent => Some(Role::Sent),
            MailboxArg::Drafts => Some(Role::Drafts),
            MailboxArg::Trash => Some(Role::Trash),
            MailboxArg::All => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync mailboxes, identities and cached mail
    Refresh,

    /// List mailboxes with their counters
    Mailboxes,

    /// List threads in a mailbox
    List {
        #[arg(value_enum, default_value_t = MailboxArg::Inbox)]
        mailbox: MailboxArg,

        /// Also load the page after the cached ones
        #[arg(long)]
        more: bool,
    },

    /// Mark a thread as read
    Read { thread: String },

    /// Mark a thread as unread
    Unread { thread: String },

    /// Flag a thread
    Flag { thread: String },

    /// Remove the flag from a thread
    Unflag { thread: String },

    /// Move a thread to the archive
    Archive { thread: String },

    /// Move a thread to the trash
    Trash { thread: String },

    /// Move a thread back to the inbox
    Restore { thread: String },

    /// Send a draft
    Send {
        email: String,
        /// Identity to send as (default: the first one)
        #[arg(long)]
        identity: Option<String>,
    },
}

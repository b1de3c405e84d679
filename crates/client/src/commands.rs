// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Command line front end.

use std::future::Future;

use tracing::warn;

use mua_core::{Cache, EmailQuery, SqliteCache, Status};

use crate::cli::{Command, MailboxArg};
use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::mua::Mua;
use crate::transport::Transport;

/// Passes made by one command before it reports partial results.
const MAX_ROUNDS: usize = 5;

/// Runs `command` against the configured account.
pub async fn run(config_path: Option<std::path::PathBuf>, command: Command) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => config::default_path()?,
    };
    let config = Config::load(&path)?;
    let cache_path = config.cache_path()?;
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cache = SqliteCache::open(&cache_path)?;
    let mut mua = Mua::connect(&config, cache).await?;

    let result = execute(&mua, command).await;
    mua.disconnect().await?;
    result
}

/// Repeats `step` while it reports more work, up to [`MAX_ROUNDS`] times.
async fn settle<F, Fut>(mut step: F) -> Result<Status>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Status>>,
{
    let mut settled = Status::Unchanged;
    for _ in 0..MAX_ROUNDS {
        let status = step().await?;
        if !status.needs_more() {
            return Ok(settled.max(status));
        }
        settled = Status::Updated;
    }
    warn!("Still behind the server after {} passes", MAX_ROUNDS);
    Ok(Status::HasMore)
}

async fn execute<C: Cache, T: Transport>(mua: &Mua<C, T>, command: Command) -> Result<()> {
    match command {
        Command::Refresh => {
            let status = Status::merge([
                settle(|| mua.refresh_identities()).await?,
                settle(|| mua.refresh()).await?,
            ]);
            println!("{status}");
        }
        Command::Mailboxes => {
            settle(|| mua.refresh_mailboxes()).await?;
            let mut mailboxes = mua.mailboxes().await?;
            mailboxes.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
            for mailbox in mailboxes {
                println!(
                    "{:<20} {:>6} unread {:>6} total",
                    mailbox.name, mailbox.unread_threads, mailbox.total_threads
                );
            }
        }
        Command::List { mailbox, more } => {
            let query = mailbox_query(mua, mailbox).await?;
            settle(|| mua.query(&query)).await?;
            if more {
                mua.query_page(&query).await?;
            }
            for item in mua.query_items(&query).await? {
                let subject = mua
                    .email(&item.email_id)
                    .await?
                    .and_then(|e| e.subject)
                    .unwrap_or_default();
                println!("{}  {}", item.thread_id, subject);
            }
        }
        Command::Read { thread } => report(mua.mark_read(&thread).await?),
        Command::Unread { thread } => report(mua.mark_unread(&thread).await?),
        Command::Flag { thread } => report(mua.flag(&thread).await?),
        Command::Unflag { thread } => report(mua.unflag(&thread).await?),
        Command::Archive { thread } => report(mua.archive(&thread).await?),
        Command::Trash { thread } => report(mua.move_to_trash(&thread).await?),
        Command::Restore { thread } => report(mua.move_to_inbox(&thread).await?),
        Command::Send { email, identity } => {
            let identity = match identity {
                Some(identity) => identity,
                None => {
                    settle(|| mua.refresh_identities()).await?;
                    mua.identities()
                        .await?
                        .into_iter()
                        .next()
                        .map(|i| i.id)
                        .ok_or_else(|| Error::NotFound("identity".to_string()))?
                }
            };
            report(mua.submit(&email, &identity).await?);
        }
    }
    Ok(())
}

fn report(status: Status) {
    println!("{status}");
}

async fn mailbox_query<C: Cache, T: Transport>(
    mua: &Mua<C, T>,
    mailbox: MailboxArg,
) -> Result<EmailQuery> {
    let Some(role) = mailbox.role() else {
        return Ok(EmailQuery::unfiltered());
    };
    settle(|| mua.refresh_mailboxes()).await?;
    mua.mailboxes()
        .await?
        .into_iter()
        .find(|m| m.role == Some(role))
        .map(|m| EmailQuery::in_mailbox(m.id))
        .ok_or_else(|| Error::NotFound(format!("{} mailbox", role.as_str())))
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;

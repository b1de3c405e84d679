// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mua-remote: in-memory mail server for developing and testing mua.
//!
//! Serves one account over WebSocket. Every run starts from scratch; with
//! `--seed` the account holds a small demo mailbox.

use clap::Parser;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mua_remote::{server, MailStore, ServerState};

/// mua-remote: in-memory mail server
#[derive(Parser, Debug)]
#[command(name = "mua-remote")]
#[command(about = "In-memory mail server speaking the mua WebSocket protocol")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "127.0.0.1:7891")]
    bind: SocketAddr,

    /// Account id served
    #[arg(short, long, default_value = "a1")]
    account: String,

    /// Start with demo mailboxes and threads
    #[arg(long)]
    seed: bool,

    /// Largest number of objects one Get may request
    #[arg(long)]
    max_objects_in_get: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mua-remote server");
    info!("  Bind address: {}", args.bind);
    info!("  Account: {}", args.account);

    let mut store = if args.seed {
        info!("  Seeded with demo mail");
        MailStore::demo(args.account)
    } else {
        MailStore::new(args.account)
    };
    store.set_max_objects_in_get(args.max_objects_in_get);

    server::run(args.bind, ServerState::new(store)).await?;

    Ok(())
}

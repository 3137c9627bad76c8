//! tillsync command-line client
//!
//! Runs one tenant's sync session against an HTTP backend until Ctrl-C:
//! initial full sync, realtime refreshes over SSE, and the polling
//! fallback.
//!
//! Usage:
//!   tillsync --config tillsync.json
//!   tillsync --tenant acme --base-url https://pos.example.com --once

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tillsync_cli::{collection_counts, CliConfig, Overrides};
use tillsync_sync::{LocalStateStore, SyncSession};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "tillsync")]
#[command(about = "Keeps a local copy of a tillsync tenant in sync with the backend")]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tenant to sync (overrides the config file)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Backend base URL for both REST and realtime
    #[arg(long)]
    base_url: Option<String>,

    /// Backend API key
    #[arg(long, env = "TILLSYNC_API_KEY")]
    api_key: Option<String>,

    /// Start in offline mode (no session)
    #[arg(long)]
    offline: bool,

    /// Run the initial sync, print a summary and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut config = CliConfig::load_or_default(args.config.as_deref())?;
    config.apply(Overrides {
        tenant: args.tenant,
        offline: args.offline,
        base_url: args.base_url,
        api_key: args.api_key,
    });

    let context = config.session_context()?;
    let (deps, store) = config.build_deps()?;

    info!("tillsync starting...");
    let Some(mut session) = SyncSession::start(context, deps, config.sync.clone()).await? else {
        bail!("No session started: set a tenant and leave offline mode to sync");
    };

    print_summary(&session, store.as_ref());

    if args.once {
        session.shutdown();
        return Ok(());
    }

    println!("  Syncing. Press Ctrl-C to stop.\n");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }

    info!("Shutting down");
    print_summary(&session, store.as_ref());
    session.shutdown();
    Ok(())
}

fn print_summary(session: &SyncSession, store: &dyn LocalStateStore) {
    println!("\n========================================");
    println!("  tillsync");
    println!("========================================");
    println!("  Tenant:      {}", session.tenant());
    println!(
        "  Initialized: {}",
        if session.engine().state().is_initialized() { "yes" } else { "no" }
    );
    println!();
    for (table, count) in collection_counts(store) {
        println!("  {:<18} {:>6}", table.name(), count);
    }
    println!("========================================\n");
}

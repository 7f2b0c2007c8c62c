mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use colored::Colorize;
use confmark::config::Config;
use confmark::output::Event;
use confmark::{
    Collection, DirectExchange, FileMedium, IdentityBridge, LoadOutcome, LocalPreferenceStore,
    PreferenceSync, PrimarySession,
};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str()));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Command-line flags take precedence over the config file
    let local_path = match &cli.local {
        Some(path) => path.clone(),
        None => config.local_path()?,
    };
    let remote_config = cli.remote.clone().unwrap_or_else(|| config.remote.clone());
    let user = cli
        .user
        .clone()
        .or_else(|| config.identity.user.clone())
        .filter(|u| !u.is_empty());
    let email = cli.email.clone().or_else(|| config.identity.email.clone());

    let local = LocalPreferenceStore::new(Arc::new(FileMedium::new(&local_path)));
    let remote = remote_config
        .open()
        .await
        .context("Failed to open remote store")?;

    let bridge = IdentityBridge::new(Box::new(DirectExchange));
    bridge
        .set_primary_session(user.map(|u| PrimarySession::new(u).with_email(email)))
        .await;
    let auth = bridge.current();
    if let Some(ref error) = auth.error {
        tracing::warn!("Sign-in failed: {}", error);
    }

    let engine = PreferenceSync::new(local, remote, bridge.subscribe());

    // Clearing must not trigger a sync first
    let outcome = match cli.command {
        Command::Clear => None,
        _ => Some(engine.load_data().await),
    };

    match &cli.command {
        Command::List => {
            if cli.json {
                Event::List {
                    snapshot: engine.snapshot(),
                }
                .emit();
            } else {
                print_collection("Bookmarks", &engine.bookmarks());
                print_collection("Starred", &engine.starred());
            }
        }
        Command::Bookmark { session_id, title } => {
            let result = engine.add_bookmark(session_id, title.as_deref()).await;
            report_mutation(&cli, Collection::Bookmarks, session_id, true, result)?;
        }
        Command::Unbookmark { session_id } => {
            let result = engine.remove_bookmark(session_id).await;
            report_mutation(&cli, Collection::Bookmarks, session_id, false, result)?;
        }
        Command::Star { session_id, title } => {
            let result = engine.add_starred(session_id, title.as_deref()).await;
            report_mutation(&cli, Collection::Starred, session_id, true, result)?;
        }
        Command::Unstar { session_id } => {
            let result = engine.remove_starred(session_id).await;
            report_mutation(&cli, Collection::Starred, session_id, false, result)?;
        }
        Command::Check { session_id } => {
            let bookmarked = engine.is_bookmarked(session_id);
            let starred = engine.is_starred(session_id);
            if cli.json {
                Event::Check {
                    session_id: session_id.clone(),
                    bookmarked,
                    starred,
                }
                .emit();
            } else {
                println!("{}", session_id.bold());
                println!("  Bookmarked: {}", yes_no(bookmarked));
                println!("  Starred:    {}", yes_no(starred));
            }
        }
        Command::Sync => {
            if let Some(outcome) = outcome {
                if cli.json {
                    Event::Loaded { outcome }.emit();
                } else if !cli.quiet {
                    print_outcome(&outcome);
                }
            }
        }
        Command::Status => {
            let identity = auth.uid().map(str::to_string);
            let first_sync_done = identity
                .as_deref()
                .map(|uid| engine.local().first_sync_done(uid))
                .unwrap_or(false);
            let event = Event::Status {
                identity,
                remote: remote_config.kind().map(str::to_string),
                local_path: local_path.display().to_string(),
                first_sync_done,
                bookmarks: engine.bookmarks().len(),
                starred: engine.starred().len(),
            };

            if cli.json {
                event.emit();
            } else {
                print_status(&event);
            }
        }
        Command::Clear => {
            engine.local().clear();
            if cli.json {
                Event::Cleared.emit();
            } else if !cli.quiet {
                println!("{}", "✓ Device preferences cleared".green().bold());
            }
        }
    }

    Ok(())
}

/// Report a mutation; a reverted remote write becomes a non-zero exit
fn report_mutation(
    cli: &Cli,
    collection: Collection,
    session_id: &str,
    added: bool,
    result: confmark::Result<()>,
) -> Result<()> {
    match result {
        Ok(()) => {
            if cli.json {
                let session_id = session_id.to_string();
                let event = if added {
                    Event::Added {
                        collection,
                        session_id,
                    }
                } else {
                    Event::Removed {
                        collection,
                        session_id,
                    }
                };
                event.emit();
            } else if !cli.quiet {
                let verb = match (collection, added) {
                    (Collection::Bookmarks, true) => "Bookmarked",
                    (Collection::Bookmarks, false) => "Removed bookmark",
                    (Collection::Starred, true) => "Starred",
                    (Collection::Starred, false) => "Removed star",
                };
                println!("{} {} {}", "✓".green(), verb, session_id.bold());
            }
            Ok(())
        }
        Err(e) => {
            if cli.json {
                Event::Reverted {
                    collection,
                    session_id: session_id.to_string(),
                    error: e.to_string(),
                }
                .emit();
            }
            Err(e.into())
        }
    }
}

fn print_collection(name: &str, ids: &[String]) {
    println!("{} ({})", name.bold(), ids.len());
    if ids.is_empty() {
        println!("  {}", "none".bright_black());
    }
    for id in ids {
        println!("  {}", id);
    }
}

fn print_outcome(outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Deferred => println!("{}", "Identity still resolving".yellow()),
        LoadOutcome::LocalOnly => {
            println!("{}", "Not syncing: using device preferences only".yellow())
        }
        LoadOutcome::FirstSync {
            identity,
            backfilled,
            failed,
        } => {
            println!("{} {}", "✓ First sync for".green().bold(), identity.bold());
            println!("  Uploaded:  {}", backfilled.to_string().blue());
            if *failed > 0 {
                println!("  Failed:    {}", failed.to_string().red());
            }
        }
        LoadOutcome::Mirrored { identity } => {
            println!("{} {}", "✓ Synced from remote for".green().bold(), identity.bold())
        }
        LoadOutcome::Fallback => {
            println!("{}", "Sync failed: showing device preferences".red())
        }
    }
}

fn print_status(event: &Event) {
    if let Event::Status {
        identity,
        remote,
        local_path,
        first_sync_done,
        bookmarks,
        starred,
    } = event
    {
        println!("confmark v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "  Identity:    {}",
            identity.as_deref().unwrap_or("signed out").blue()
        );
        println!("  Remote:      {}", remote.as_deref().unwrap_or("none").blue());
        println!("  Local file:  {}", local_path);
        println!("  First sync:  {}", yes_no(*first_sync_done));
        println!("  Bookmarks:   {}", bookmarks.to_string().blue());
        println!("  Starred:     {}", starred.to_string().blue());
    }
}

fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "yes".green()
    } else {
        "no".bright_black()
    }
}

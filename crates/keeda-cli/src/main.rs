//! keeda - command-line front end for KeePass vaults.
//!
//! The master password comes from `KEEDA_PASSWORD` (a `.env` file in the
//! working directory is loaded first).

mod app;
mod config;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keeda_core::audit::DEFAULT_MIN_SCORE;
use keeda_core::{audit_vault, import_into, search, GroupUpdate, ImportSource, RecycleOutcome};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use app::{read_secret, resolve_entry, resolve_group, App, IMPORT_PASSWORD_VAR};
use config::Config;

/// keeda - manage KeePass vaults and import credentials from other managers
#[derive(Parser, Debug)]
#[command(name = "keeda")]
#[command(about = "Manage KeePass vaults and import credentials from other password managers")]
struct Args {
    /// Path to the config file (defaults to ~/.config/keeda/keeda.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the KeePass database file (overrides the config)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new database with the default groups
    New {
        /// Database name
        #[arg(long, default_value = "Passwords")]
        name: String,
    },
    /// Print the group tree, recycle bin last
    Tree {
        /// Also list entries under each group
        #[arg(short, long)]
        entries: bool,
    },
    /// Fuzzy-search groups and entries
    Search {
        query: String,
        /// Maximum number of results (defaults to the config value)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Import entries from another password manager
    Import {
        /// One of: generic-csv, lastpass, apple, chrome, firefox, bitwarden, kdbx
        #[arg(short, long, value_parser = parse_source)]
        source: ImportSource,
        /// Export file to read
        #[arg(short, long)]
        file: PathBuf,
        /// Target group name or UUID (defaults to the config value, then the root)
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Add a group
    AddGroup {
        name: String,
        /// Parent group name or UUID (defaults to the root)
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Move a group under another group
    MoveGroup { group: String, parent: String },
    /// Move an entry to the recycle bin (or delete it if already there)
    Recycle { entry: Uuid },
    /// Move a recycled entry back to its original group
    Restore { entry: Uuid },
    /// Permanently delete everything in the recycle bin
    EmptyBin,
    /// Print the current one-time code of an entry
    Otp {
        /// Entry title or UUID
        entry: String,
    },
    /// List entries with weak passwords
    Audit {
        /// Passwords scoring below this (0-4) are reported
        #[arg(long, default_value_t = DEFAULT_MIN_SCORE)]
        min_score: u8,
    },
}

fn parse_source(value: &str) -> std::result::Result<ImportSource, String> {
    value.parse().map_err(|e: keeda_core::VaultError| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("keeda=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = Config::load(args.config)?;
    let database = args.database.unwrap_or_else(|| config.database_path.clone());
    tracing::info!("Using database: {}", database.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("Failed to start async runtime")?;
    let app = App::from_env(database)?.with_max_backups(config.max_backups);
    runtime.block_on(run(app, &config, args.command))
}

async fn run(app: App, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::New { name } => {
            let vault = app.create(&name).await?;
            print!("{}", ui::render_tree(&ui::flatten(&vault.list_groups_ordered(), false)));
        }
        Command::Tree { entries } => {
            let vault = app.unlock().await?;
            let items = ui::flatten(&vault.list_groups_ordered(), entries);
            print!("{}", ui::render_tree(&items));
            println!("{} entries", vault.entry_count());
        }
        Command::Search { query, limit } => {
            let vault = app.unlock().await?;
            let results = search(&vault.root, &query, limit.unwrap_or(config.search_limit));
            print!("{}", ui::render_search(&results));
        }
        Command::Import {
            source,
            file,
            group,
        } => {
            let payload = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let password = if source.requires_password() {
                Some(read_secret(IMPORT_PASSWORD_VAR)?)
            } else {
                None
            };
            let records = source.importer(password)?.parse(&payload)?;

            let mut vault = app.unlock().await?;
            let group_spec = group.as_deref().or(config.default_import_group.as_deref());
            let target = resolve_group(&vault, group_spec)?;
            let ids = import_into(&mut vault, target, records)?;
            app.save(&vault).await?;
            println!("Imported {} entries from {}", ids.len(), source);
        }
        Command::AddGroup { name, parent } => {
            let mut vault = app.unlock().await?;
            let parent = resolve_group(&vault, parent.as_deref())?;
            let id = vault.add_group(parent, &name, None, None)?.uuid;
            app.save(&vault).await?;
            println!("Added group {name} ({id})");
        }
        Command::MoveGroup { group, parent } => {
            let mut vault = app.unlock().await?;
            let id = resolve_group(&vault, Some(&group))?;
            let parent = resolve_group(&vault, Some(&parent))?;
            let update = GroupUpdate {
                name: vault.find_group(id).map(|g| g.name.clone()).unwrap_or_default(),
                parent: Some(parent),
                ..GroupUpdate::default()
            };
            vault.update_group(id, &update)?;
            app.save(&vault).await?;
            println!("Moved group {group}");
        }
        Command::Recycle { entry } => {
            let mut vault = app.unlock().await?;
            match vault.recycle_entry(entry)? {
                RecycleOutcome::Recycled => println!("Moved entry {entry} to the recycle bin"),
                RecycleOutcome::Deleted => println!("Deleted entry {entry}"),
            }
            app.save(&vault).await?;
        }
        Command::Restore { entry } => {
            let mut vault = app.unlock().await?;
            let group = vault.restore_entry(entry)?;
            app.save(&vault).await?;
            println!("Restored entry {entry} to {}", group.name);
        }
        Command::EmptyBin => {
            let mut vault = app.unlock().await?;
            let removed = vault.empty_recycle_bin()?;
            app.save(&vault).await?;
            println!("Removed {removed} entries");
        }
        Command::Otp { entry } => {
            let vault = app.unlock().await?;
            let entry = resolve_entry(&vault, &entry)?;
            let code = entry
                .totp_code()?
                .with_context(|| format!("'{}' has no one-time password", entry.title()))?;
            println!("{} (valid for {}s)", code.code, code.valid_for.as_secs());
        }
        Command::Audit { min_score } => {
            let vault = app.unlock().await?;
            let weak = audit_vault(&vault, min_score);
            print!("{}", ui::render_audit(&weak));
            println!("{} weak passwords", weak.len());
        }
    }
    Ok(())
}

//! clipshot command line
//!
//! `run` captures in the foreground until Ctrl-C; the other subcommands
//! inspect or edit the stored history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipshot::config::{default_config_path, Settings};
use clipshot::{History, ItemId, ItemKind, ItemQuery, ItemStore};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the settings file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture clipboard changes and new screenshots until interrupted
    Run,
    /// Print stored items, newest first
    List {
        /// Only items of this kind (text, url, code, screenshot, image)
        #[arg(short, long)]
        kind: Option<ItemKind>,
        /// Only favorites
        #[arg(short, long)]
        favorites: bool,
        /// Case-insensitive substring filter
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
        /// Emit JSON instead of one line per item
        #[arg(long)]
        json: bool,
    },
    /// Delete every stored item
    Clear,
    /// Delete one item
    Delete { id: ItemId },
    /// Toggle the favorite flag of one item
    Favorite { id: ItemId },
}

fn load_settings(args: &Args) -> Result<Settings> {
    let path = args.config.clone().unwrap_or_else(default_config_path);
    let mut settings =
        Settings::load(&path).with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(database) = &args.database {
        settings.database_path = Some(database.clone());
    }
    Ok(settings)
}

fn open_store(settings: &Settings) -> Result<ItemStore> {
    let path = settings.resolved_database_path();
    ItemStore::open(&path).with_context(|| format!("Failed to open database at {}", path.display()))
}

async fn run(settings: Settings) -> Result<()> {
    let history = History::from_settings(settings).context("Failed to start history")?;
    history.start()?;
    println!("Capturing. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    history.shutdown().await;
    println!("Stopped. {} items in history.", history.store().count()?);
    Ok(())
}

fn list(store: &ItemStore, query: ItemQuery, json: bool) -> Result<()> {
    let items = store.query(&query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for item in &items {
        println!(
            "{:>6}  {}  {:<10} {} {}",
            item.id,
            item.timestamp.format("%Y-%m-%d %H:%M:%S"),
            item.kind(),
            if item.is_favorite { "★" } else { " " },
            item.preview(80)
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    clipshot::logging::init();
    let args = Args::parse();
    let settings = load_settings(&args)?;

    match args.command {
        Command::Run => run(settings).await,
        Command::List {
            kind,
            favorites,
            search,
            limit,
            json,
        } => {
            let store = open_store(&settings)?;
            let query = ItemQuery {
                kind,
                favorites_only: favorites,
                search,
                limit: Some(limit),
            };
            list(&store, query, json)
        }
        Command::Clear => {
            open_store(&settings)?.clear_all()?;
            println!("History cleared.");
            Ok(())
        }
        Command::Delete { id } => {
            if !open_store(&settings)?.delete(id)? {
                anyhow::bail!("No item with id {}", id);
            }
            println!("Deleted {}.", id);
            Ok(())
        }
        Command::Favorite { id } => {
            let favorite = open_store(&settings)?.toggle_favorite(id)?;
            println!("{} {}.", if favorite { "Favorited" } else { "Unfavorited" }, id);
            Ok(())
        }
    }
}

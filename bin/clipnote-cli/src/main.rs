//! clipnote CLI - inspect and maintain a clipnote data directory
//!
//! Opens the same storage an application would and runs one command
//! against it. Records and index entries are printed as JSON.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use clipnote_common::{ClipContent, ClipboardItem, Config, Note, Record, RecordId};
use clipnote_engine::{Repository, RepositoryStats, Storage, StorageFactory};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "clipnote")]
#[command(about = "clipnote storage maintenance")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "CLIPNOTE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides storage.base_dir)
    #[arg(short, long, env = "CLIPNOTE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (overrides logging.level)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Note,
    Clipboard,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show counts and cache statistics for both kinds
    Stats,
    /// List index entries, newest first
    List {
        #[arg(short, long, value_enum, default_value = "note")]
        kind: Kind,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        #[arg(short, long, default_value = "0")]
        offset: usize,
    },
    /// Full-text search (a trailing `*` makes a prefix term)
    Search {
        query: String,
        #[arg(short, long, value_enum, default_value = "note")]
        kind: Kind,
    },
    /// Print a full record
    Show {
        id: RecordId,
        #[arg(short, long, value_enum, default_value = "note")]
        kind: Kind,
    },
    /// Add a note
    AddNote {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        content: String,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Add a text clipboard item
    AddClip {
        text: String,
        /// Application the text came from
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Delete records
    Delete {
        #[arg(required = true)]
        ids: Vec<RecordId>,
        #[arg(short, long, value_enum, default_value = "note")]
        kind: Kind,
    },
    /// Compact the index database
    Compact,
    /// Rebuild the index from stored payloads
    RebuildIndex {
        /// Only this kind (default: both)
        #[arg(short, long, value_enum)]
        kind: Option<Kind>,
    },
    /// Index payloads missing from the index and drop entries without a
    /// payload
    Reconcile {
        /// Only this kind (default: both)
        #[arg(short, long, value_enum)]
        kind: Option<Kind>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.storage.base_dir.clone_from(dir);
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_stats(stats: &RepositoryStats) {
    println!("{}", stats.kind);
    println!("  indexed:   {}", stats.indexed);
    println!("  payloads:  {}", stats.payloads);
    println!("  pending:   {}", stats.pending_reconcile);
    for (tier, s) in [
        ("records", stats.cache.records),
        ("entries", stats.cache.entries),
        ("searches", stats.cache.searches),
    ] {
        println!(
            "  cache {:<9} {}/{} (hits {}, misses {}, evictions {}, ratio {:.2})",
            tier,
            s.len,
            s.capacity,
            s.hits,
            s.misses,
            s.evictions,
            s.hit_ratio()
        );
    }
}

async fn list<R: Record>(repo: &Repository<R>, limit: usize, offset: usize) -> Result<()> {
    print_json(&repo.list(limit, offset).await?)
}

async fn search<R: Record>(repo: &Repository<R>, query: &str) -> Result<()> {
    print_json(&repo.search(query).await?)
}

async fn show<R: Record>(repo: &Repository<R>, id: RecordId) -> Result<()> {
    print_json(&repo.fetch(id).await?)
}

async fn delete<R: Record>(repo: &Repository<R>, ids: &[RecordId]) -> Result<()> {
    let report = repo.delete_batch(ids).await;
    println!("Deleted {} {}(s)", report.deleted, R::KIND);
    for (id, e) in &report.failed {
        eprintln!("Failed to delete {id}: {e}");
    }
    if !report.is_complete() {
        bail!("{} delete(s) failed", report.failed.len());
    }
    Ok(())
}

async fn rebuild<R: Record>(repo: &Repository<R>) -> Result<()> {
    let count = repo.rebuild_index().await?;
    println!("Rebuilt {} index: {count} entries", R::KIND);
    Ok(())
}

async fn reconcile<R: Record>(repo: &Repository<R>) -> Result<()> {
    let report = repo.sync_index().await?;
    println!(
        "Reconciled {} index: {} added, {} removed",
        R::KIND,
        report.added.len(),
        report.removed.len()
    );
    for id in &report.skipped {
        eprintln!("Unreadable payload left unindexed: {id}");
    }
    Ok(())
}

async fn run(storage: Storage, command: Commands) -> Result<()> {
    match command {
        Commands::Stats => {
            println!("Storage: {}", storage.mode);
            print_stats(&storage.notes.stats().await?);
            print_stats(&storage.clipboard.stats().await?);
        }
        Commands::List {
            kind,
            limit,
            offset,
        } => match kind {
            Kind::Note => list(&storage.notes, limit, offset).await?,
            Kind::Clipboard => list(&storage.clipboard, limit, offset).await?,
        },
        Commands::Search { query, kind } => match kind {
            Kind::Note => search(&storage.notes, &query).await?,
            Kind::Clipboard => search(&storage.clipboard, &query).await?,
        },
        Commands::Show { id, kind } => match kind {
            Kind::Note => show(&storage.notes, id).await?,
            Kind::Clipboard => show(&storage.clipboard, id).await?,
        },
        Commands::AddNote {
            title,
            content,
            tags,
        } => {
            let mut note = Note::new(RecordId::new(), title, content);
            note.tags = tags;
            storage.notes.create(note.clone()).await?;
            info!("Created note {}", note.id);
            println!("{}", note.id);
        }
        Commands::AddClip { text, source } => {
            let mut item = ClipboardItem::new(RecordId::new(), ClipContent::Text(text));
            item.source_app = source;
            storage.clipboard.create(item.clone()).await?;
            info!("Created clipboard item {}", item.id);
            println!("{}", item.id);
        }
        Commands::Delete { ids, kind } => match kind {
            Kind::Note => delete(&storage.notes, &ids).await?,
            Kind::Clipboard => delete(&storage.clipboard, &ids).await?,
        },
        Commands::Compact => {
            // Both kinds share one database file
            let compacted = storage.notes.compact().await?;
            println!("Compacted: {compacted}");
        }
        Commands::RebuildIndex { kind } => match kind {
            Some(Kind::Note) => rebuild(&storage.notes).await?,
            Some(Kind::Clipboard) => rebuild(&storage.clipboard).await?,
            None => {
                rebuild(&storage.notes).await?;
                rebuild(&storage.clipboard).await?;
            }
        },
        Commands::Reconcile { kind } => match kind {
            Some(Kind::Note) => reconcile(&storage.notes).await?,
            Some(Kind::Clipboard) => reconcile(&storage.clipboard).await?,
            None => {
                reconcile(&storage.notes).await?;
                reconcile(&storage.clipboard).await?;
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let storage = StorageFactory::new(config).open()?;
    if storage.is_degraded() {
        eprintln!("Storage is {}; changes will not be saved", storage.mode);
    }

    run(storage, args.command).await
}

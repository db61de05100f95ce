//! Inspect and maintain a clipboard history database offline.
//!
//! Usage:
//!     cargo run --bin history-tool -- --db copy_stack.db list
//!     cargo run --bin history-tool -- --db copy_stack.db seed 50
//!
//! Set RUST_LOG=debug for store diagnostics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use copystack::database::Database;
use copystack::formats::{self, PREVIEW_CHARS};
use copystack::{ClipboardEvent, ClipboardItem, DataItem, EventId, HistoryStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "history-tool", about = "Inspect a Copy Stack history database")]
struct Cli {
    /// Path of the SQLite history database
    #[arg(long, default_value = "copy_stack.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print stored events, newest first
    List {
        /// Emit full records as JSON (payloads base64)
        #[arg(long)]
        json: bool,
    },
    /// Print one event with every representation
    Show { id: EventId },
    /// Delete one event (absent ids are ignored)
    Delete { id: EventId },
    /// Delete every event
    Clear,
    /// Print the capacity
    GetMax,
    /// Change the capacity (1-1000)
    SetMax { max_items: i64 },
    /// Insert sample events
    Seed {
        #[arg(default_value_t = 20)]
        count: usize,
    },
}

/// Sample snippets for seeded events
const SAMPLES: &[&str] = &[
    "git commit -m \"Fix race in clipboard watcher\"",
    "https://docs.rs/rusqlite/latest/rusqlite/",
    "SELECT id, capturedAt FROM events ORDER BY id DESC;",
    "Meeting moved to Thursday 3pm",
    "#FF5733",
    "fn main() {\n    println!(\"hello\");\n}",
];

fn sample_event(index: usize) -> ClipboardEvent {
    let text = format!("{} ({})", SAMPLES[index % SAMPLES.len()], index);
    if index % 3 == 0 {
        // Rich copy: plain text plus an RTF flavor
        let rtf = format!("{{\\rtf1\\ansi {}}}", text);
        ClipboardEvent::new(vec![ClipboardItem::new(vec![
            DataItem::new(formats::UTF8_PLAIN_TEXT, text.as_bytes()),
            DataItem::new(formats::RTF, rtf.into_bytes()),
        ])])
    } else {
        ClipboardEvent::from_text(&text)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database = Database::open(&cli.db)
        .with_context(|| format!("opening {}", cli.db.display()))?;
    let store = HistoryStore::open(Arc::new(database), 100)?;

    match cli.command {
        Command::List { json } => {
            let records = store.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!(
                        "{:>6}  {}  {}",
                        record.id,
                        record.captured_at.format("%Y-%m-%d %H:%M:%S"),
                        record.preview(PREVIEW_CHARS)
                    );
                }
                println!("{} / {} events", records.len(), store.max_items());
            }
        }
        Command::Show { id } => {
            let record = store
                .get(id)
                .with_context(|| format!("event {} not found", id))?;
            println!("id:          {}", record.id);
            println!("captured_at: {}", record.captured_at.to_rfc3339());
            println!("hash:        {}", record.content_hash);
            for (index, item) in record.event.items.iter().enumerate() {
                println!("item {}:", index);
                for rep in &item.representations {
                    println!("  {:<32} {} bytes", rep.format, rep.payload.len());
                }
            }
        }
        Command::Delete { id } => {
            if store.delete(id) {
                println!("Deleted event {}", id);
            } else {
                println!("No event {}", id);
            }
        }
        Command::Clear => {
            store.clear_all();
            println!("History cleared");
        }
        Command::GetMax => println!("{}", store.max_items()),
        Command::SetMax { max_items } => {
            store.set_max_items(max_items)?;
            println!("Capacity set to {} ({} events kept)", store.max_items(), store.len());
        }
        Command::Seed { count } => {
            for index in 0..count {
                store.insert(sample_event(index));
            }
            println!("Inserted {} events ({} kept)", count, store.len());
        }
    }

    store.flush()?;
    Ok(())
}

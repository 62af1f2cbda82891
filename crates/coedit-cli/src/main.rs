//! coedit - operator CLI for the conflict resolution engine
//!
//! # Usage
//!
//! ```bash
//! # Replay an operation log against a fresh document
//! coedit replay ops.ndjson --document plan:1 --initial "Hello"
//!
//! # Machine-readable output
//! coedit replay ops.ndjson --document plan:1 --json
//!
//! # Persist the resulting export, then inspect it later
//! coedit replay ops.ndjson --document plan:1 --store coedit.db
//! coedit show plan:1 --store coedit.db
//!
//! # With configuration file
//! coedit --config /etc/coedit/config.toml replay ops.ndjson --document plan:1
//! ```

mod config;
mod replay;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use coedit_core::{ConflictResolutionService, DocumentId, DocumentStats, ExportPayload};
use coedit_storage::{SqliteStorage, Storage};

use crate::config::FileConfig;
use crate::replay::ReplayReport;

/// coedit - collaborative document conflict resolution
#[derive(Parser, Debug)]
#[command(name = "coedit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "COEDIT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COEDIT_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Give up on a busy document after this many milliseconds
    #[arg(long, env = "COEDIT_LOCK_TIMEOUT_MS", global = true)]
    lock_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a newline-delimited JSON operation log
    Replay {
        /// Operation log, one JSON operation per line ("-" for stdin)
        log: PathBuf,

        /// Document ID to create and replay into
        #[arg(short, long)]
        document: String,

        /// Initial document content
        #[arg(long, default_value = "")]
        initial: String,

        /// SQLite database to store the resulting export in
        #[arg(long, env = "COEDIT_STORE")]
        store: Option<PathBuf>,

        /// Abort on the first malformed or rejected operation
        #[arg(long)]
        stop_on_error: bool,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show a stored document export
    Show {
        /// Document ID
        document: String,

        /// SQLite database holding the export
        #[arg(long, env = "COEDIT_STORE")]
        store: PathBuf,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    // Command line and environment win over the config file
    let log_level = args
        .log_level
        .clone()
        .or_else(|| file_config.log.level.clone())
        .unwrap_or_else(|| "info".to_string());
    init_logging(&log_level);

    let mut service_config = file_config.service;
    if let Some(ms) = args.lock_timeout_ms {
        service_config.lock_timeout_ms = Some(ms);
    }

    match args.command {
        Command::Replay {
            log,
            document,
            initial,
            store,
            stop_on_error,
            json,
        } => {
            let service = ConflictResolutionService::with_config(service_config)?;
            let id = DocumentId::new(document)?;
            service.create_document(id.clone(), initial, "coedit-cli")?;

            let reader = open_log(&log)?;
            info!(document = %id, log = %log.display(), "Replaying operation log");
            let report = replay::replay(&service, &id, reader, stop_on_error)?;

            let export = service.export_document(&id)?;
            let stats = service.get_document_statistics(&id)?;

            if let Some(path) = &store {
                let storage = SqliteStorage::new(path)?;
                storage.store(&export).await?;
                info!(document = %id, path = %path.display(), "Stored export");
            }

            if json {
                let out = serde_json::json!({
                    "report": report,
                    "document": export.document,
                    "stats": stats,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_report(&report);
                print_export(&export, Some(&stats));
            }
        }

        Command::Show {
            document,
            store,
            json,
        } => {
            let id = DocumentId::new(document)?;
            let storage = SqliteStorage::new(&store)?;
            let Some(export) = storage.load(&id).await? else {
                bail!("document {} not found in {}", id, store.display());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&export)?);
            } else {
                print_export(&export, None);
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is reserved for command output
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn open_log(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(path)
        .with_context(|| format!("failed to open operation log {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn print_report(report: &ReplayReport) {
    println!("{}", "Replay".cyan().bold());
    println!("  applied     {}", report.applied.to_string().green());
    println!("  duplicates  {}", report.duplicates.to_string().yellow());
    println!("  rejected    {}", report.rejected.len().to_string().red());
    for rejected in &report.rejected {
        println!("    {} {}", format!("line {}:", rejected.line).dimmed(), rejected.reason);
    }
    println!();
}

fn print_export(export: &ExportPayload, stats: Option<&DocumentStats>) {
    let doc = &export.document;

    println!("{} {}", "Document".cyan().bold(), doc.id.as_str().bold());
    println!("  version     {}", doc.version.to_string().yellow());
    println!("  history     {}", export.history.len());

    let vector: Vec<String> = doc.vector.iter().map(|(a, n)| format!("{}={}", a, n)).collect();
    println!("  vector      {{{}}}", vector.join(", "));

    if let Some(stats) = stats {
        let by_kind: Vec<String> = stats
            .operations_by_kind
            .iter()
            .map(|(kind, n)| format!("{}={}", kind, n))
            .collect();
        println!("  operations  {}", by_kind.join(" "));
        if stats.conflicts > 0 {
            println!("  conflicts   {}", stats.conflicts.to_string().red());
        }
    }

    if !export.users.is_empty() {
        println!("  {}", "users".yellow().bold());
        for user in export.users.values() {
            println!("    {} ({}) cursor {}", user.username, user.user_id, user.cursor);
        }
    }

    println!("{}", "Content".cyan().bold());
    if doc.content.is_empty() {
        println!("{}", "(empty)".dimmed());
    } else {
        println!("{}", doc.content);
    }
}

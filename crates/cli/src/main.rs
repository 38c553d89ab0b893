//! `ttl-remover`: rewrites SSTables with every cell expiration removed.
//!
//! ```text
//! ttl-remover --output-path /tmp/out --cql-file t.cql sstable --sstable /data/ks/t/mc-1-big-Data.db
//! ttl-remover --output-path /tmp/out --schema-dir schemas/ keyspace --keyspace /data/ks
//! ```
//!
//! Ctrl-C stops the batch after the file in flight is abandoned; files already
//! rewritten stay published and the rest are reported as failed.

mod discover;
mod interrupt;
mod logging;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use remover::{CancellationToken, RewriteConfig, RewriteSummary, SchemaSource, TtlRemover};
use schema::SchemaCatalog;

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "ttl-remover", version)]
#[command(about = "Rewrites SSTables with cell expiration removed", long_about = None)]
struct Args {
    /// Root the rewritten tables go under, as <root>/<keyspace>/<table>/.
    #[arg(long)]
    output_path: PathBuf,

    /// CREATE TABLE statement for the sources.
    #[arg(long, conflicts_with_all = ["cql_file", "schema_dir"])]
    cql: Option<String>,

    /// File holding the CREATE TABLE statement.
    #[arg(long, conflicts_with = "schema_dir")]
    cql_file: Option<PathBuf>,

    /// Directory of `.cql` schema scripts.
    #[arg(long)]
    schema_dir: Option<PathBuf>,

    /// JSON rewrite configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Files rewritten in parallel. Overrides the config file.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite a single table.
    Sstable {
        /// Path to a `*-Data.db` file.
        #[arg(long)]
        sstable: PathBuf,
    },
    /// Rewrite every table found under a keyspace directory.
    Keyspace {
        #[arg(long)]
        keyspace: PathBuf,
    },
}

impl Args {
    fn schema_source(&self) -> Result<SchemaSource> {
        if let Some(cql) = &self.cql {
            return Ok(SchemaSource::Statement(cql.clone()));
        }
        if let Some(path) = &self.cql_file {
            let cql = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
            return Ok(SchemaSource::Statement(cql));
        }
        if let Some(dir) = &self.schema_dir {
            let mut catalog = SchemaCatalog::new();
            catalog.load_dir(dir)?;
            return Ok(SchemaSource::Catalog(Arc::new(catalog)));
        }
        Ok(SchemaSource::SelfDescribing)
    }

    fn rewrite_config(&self) -> Result<RewriteConfig> {
        let mut config = match &self.config {
            Some(path) => RewriteConfig::load(path)?,
            None => RewriteConfig::default(),
        };
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config.validate()?;
        Ok(config)
    }

    fn sources(&self) -> Result<Vec<PathBuf>> {
        match &self.command {
            Command::Sstable { sstable } => {
                if !sstable.is_file() {
                    bail!("{} is not a file", sstable.display());
                }
                Ok(vec![sstable.clone()])
            }
            Command::Keyspace { keyspace } => {
                let files = discover::data_files(keyspace)?;
                if files.is_empty() {
                    bail!("no Data.db files under {}", keyspace.display());
                }
                Ok(files)
            }
        }
    }
}

fn print_summary(summary: &RewriteSummary) {
    for file in &summary.rewritten {
        println!(
            "rewrote {} -> {} ({} partitions, {} rows, {} range tombstones, {} cells made permanent)",
            file.source.display(),
            file.destination.display(),
            file.partitions,
            file.rows,
            file.range_tombstones,
            file.stripped_cells
        );
    }
    for failed in &summary.failed {
        println!("failed {}: {}", failed.source.display(), failed.error);
    }
    for suspect in &summary.suspect {
        println!("suspect {}", suspect.display());
    }
    println!(
        "{} rewritten, {} failed, {} partitions, {} cells made permanent",
        summary.rewritten.len(),
        summary.failed.len(),
        summary.partitions(),
        summary.stripped_cells()
    );
}

fn run(args: &Args) -> Result<RewriteSummary> {
    let config = args.rewrite_config()?;
    let schema = args.schema_source()?;
    let sources = args.sources()?;
    let cancel = CancellationToken::new();
    interrupt::cancel_on_interrupt(cancel.clone())?;
    let summary = TtlRemover::new(&args.output_path, schema)
        .with_config(config)
        .with_cancellation(cancel)
        .run(&sources)?;
    Ok(summary)
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = logging::init(&args.log_level, args.log_format) {
        eprintln!("error: {:#}", e);
        return ExitCode::from(2);
    }
    match run(&args) {
        Ok(summary) => {
            print_summary(&summary);
            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

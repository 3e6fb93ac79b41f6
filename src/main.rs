//! docstore CLI - seed, import and query the sample document store
//!
//! Subcommands:
//! - `seed`: load the HR and e-commerce sample records
//! - `import`: bulk-load a JSON array into a collection (bundled data by default)
//! - `catalog`: list and run the numbered example requests
//! - `verify`: report references that do not resolve
//! - `reset`: empty every collection, or just one

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use sample_docstore::catalog::{self, Domain};
use sample_docstore::config::{DEFAULT_DATABASE, DEFAULT_MAP_SIZE};
use sample_docstore::{seed, AppDbState, StoreConfig};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "docstore",
    author,
    version,
    about = "Embedded document store with HR and e-commerce sample data"
)]
struct Cli {
    /// Directory holding the `<database>.lmdb` environment
    #[arg(long, env = "DOCSTORE_DATA_DIR", default_value = ".", global = true)]
    data_dir: PathBuf,

    /// Database name
    #[arg(long, env = "DOCSTORE_DATABASE", default_value = DEFAULT_DATABASE, global = true)]
    database: String,

    /// Upper bound for the memory map, in bytes
    #[arg(long, env = "DOCSTORE_MAP_SIZE", default_value_t = DEFAULT_MAP_SIZE, global = true)]
    map_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load departments, employees, salaries, products and customers
    Seed,
    /// Import a JSON array of documents into a collection
    Import(ImportArgs),
    /// List or run the example requests
    Catalog(CatalogArgs),
    /// Check that every reference points at an existing document
    Verify,
    /// Empty every collection and drop every index
    Reset {
        /// Only empty this collection, keeping its indexes
        #[arg(long)]
        collection: Option<String>,
    },
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Target collection
    #[arg(long)]
    collection: String,

    /// JSON file to import (defaults to the bundled dataset for orders and reviews)
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CatalogArgs {
    #[command(subcommand)]
    command: CatalogCommand,
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// List entries
    List {
        /// hr or ecommerce
        #[arg(long)]
        domain: Option<Domain>,
    },
    /// Run one entry, e.g. `hr-17`
    Run {
        key: String,
        /// Also run destructive entries
        #[arg(long)]
        force: bool,
    },
    /// Run every entry in order, continuing past failures
    RunAll {
        #[arg(long)]
        domain: Option<Domain>,
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

fn main() -> Result<()> {
    init_tracing().ok();
    let cli = Cli::parse();

    let config = StoreConfig::new(&cli.data_dir, cli.database.clone()).with_map_size(cli.map_size);
    let db = AppDbState::init(&config)
        .with_context(|| format!("failed to open {}", config.environment_path().display()))?;
    info!("Using database '{}' at {}", db.name(), db.path().display());

    match cli.command {
        Commands::Seed => run_seed(&db)?,
        Commands::Import(args) => run_import(&db, args)?,
        Commands::Catalog(args) => run_catalog(&db, args.command)?,
        Commands::Verify => run_verify(&db)?,
        Commands::Reset { collection: None } => {
            db.reset_database().context("failed to reset database")?;
        }
        Commands::Reset {
            collection: Some(name),
        } => {
            let removed = db
                .clear_all_records(&name)
                .with_context(|| format!("failed to clear '{}'", name))?;
            info!("{} documents removed from '{}'", removed, name);
        }
    }

    db.close_database().context("failed to close database")?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_seed(db: &AppDbState) -> Result<()> {
    let report = seed::seed_database(db).context("failed to load sample data")?;
    print_json(&report)
}

fn run_import(db: &AppDbState, args: ImportArgs) -> Result<()> {
    let count = match &args.file {
        Some(path) => seed::import_json_file(db, &args.collection, path)
            .with_context(|| format!("failed to import {}", path.display()))?,
        None => {
            let Some(json) = seed::bundled_dataset(&args.collection) else {
                bail!("no bundled dataset for '{}', pass --file", args.collection);
            };
            seed::import_json_str(db, &args.collection, json)
                .with_context(|| format!("failed to import bundled {}", args.collection))?
        }
    };
    info!("{} documents imported into '{}'", count, args.collection);
    Ok(())
}

fn run_catalog(db: &AppDbState, command: CatalogCommand) -> Result<()> {
    match command {
        CatalogCommand::List { domain } => {
            for entry in catalog::entries(domain) {
                let kind = if entry.request.is_write() { "write" } else { "read" };
                let marker = if entry.inert { " (inert)" } else { "" };
                println!("{:<14} {:<5} {}{}", entry.key(), kind, entry.title, marker);
            }
        }
        CatalogCommand::Run { key, force } => {
            let entry = catalog::entry(&key)?;
            info!("{}: {}", entry.key(), entry.title);
            let outcome = entry
                .run(db, force)
                .with_context(|| format!("{} failed", entry.key()))?;
            print_json(&outcome)?;
        }
        CatalogCommand::RunAll { domain, force } => {
            let mut failed = Vec::new();
            for entry in catalog::entries(domain) {
                info!("{}: {}", entry.key(), entry.title);
                match entry.run(db, force) {
                    Ok(outcome) => print_json(&outcome)?,
                    Err(err) => {
                        error!("{} failed: {}", entry.key(), err);
                        failed.push(entry.key());
                    }
                }
            }
            if !failed.is_empty() {
                bail!("{} entries failed: {}", failed.len(), failed.join(", "));
            }
        }
    }
    Ok(())
}

fn run_verify(db: &AppDbState) -> Result<()> {
    let dangling = seed::verify_references(db)?;
    if dangling.is_empty() {
        return Ok(());
    }
    for reference in &dangling {
        warn!(
            "{} {}: {} = {} has no match in {}",
            reference.collection, reference.id, reference.field, reference.value, reference.target
        );
    }
    print_json(&dangling)?;
    bail!("{} dangling references", dangling.len())
}

//! Command-line interface for Nonbiri.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use nonbiri_core::config::env_vars;
use nonbiri_core::extension::{render_index, Capabilities, ExtensionRegistry, ReqwestTransport};
use nonbiri_core::models::{FilterValue, ReadingStatus};
use nonbiri_core::Config;
use nonbiri_library::Library;
use nonbiri_storage::LibraryStore;

/// Nonbiri - browse and collect manga from extension sources.
#[derive(Parser, Debug)]
#[command(name = "nonbiri")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Manage installed extensions.
    Extensions {
        #[command(subcommand)]
        cmd: ExtensionsCommand,
    },
    /// Fetch from a source.
    Browse {
        #[command(subcommand)]
        cmd: BrowseCommand,
    },
    /// Manage the saved library.
    Library {
        #[command(subcommand)]
        cmd: LibraryCommand,
    },
    /// Publish extension indexes.
    Index {
        #[command(subcommand)]
        cmd: IndexCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ExtensionsCommand {
    /// List loaded extensions.
    List,
    /// List the remote index.
    Index,
    /// Refresh the remote index, ignoring the cooldown.
    Refresh,
    /// Install an extension from the index.
    Install {
        id: String,
        /// Reinstall even if already loaded.
        #[arg(short, long)]
        force: bool,
    },
    /// Update an installed extension.
    Update { id: String },
    /// Remove an installed extension.
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum BrowseCommand {
    /// Latest updates.
    Latest {
        source: String,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Search a source.
    Search {
        source: String,
        query: String,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        /// Filter as key=value, repeatable.
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<FilterValue>,
    },
    /// Detail record of a manga.
    Manga { source: String, path: String },
    /// Chapter listing of a manga.
    Chapters { source: String, path: String },
    /// Page URLs of a chapter.
    Pages { source: String, path: String },
}

#[derive(Subcommand, Debug)]
enum LibraryCommand {
    /// List saved manga.
    List,
    /// Save a manga by source path.
    Add { source: String, path: String },
    /// Remove a saved manga.
    Remove { id: i64 },
    /// Set the reading status of a saved manga.
    Status { id: i64, status: ReadingStatus },
}

#[derive(Subcommand, Debug)]
enum IndexCommand {
    /// Load every module in a directory and write its index document.
    Build {
        dir: PathBuf,
        /// Output file, `<dir>.json` by default.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Extensions { cmd } => run_extensions(&config, cmd),
        Command::Browse { cmd } => run_browse(&config, cmd),
        Command::Library { cmd } => run_library(&config, cmd),
        Command::Index { cmd } => run_index(&config, cmd),
    }
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_filter = if verbose { "nonbiri=debug" } else { "nonbiri=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // Logs go to stderr; stdout carries the JSON output.
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_filter(s: &str) -> std::result::Result<FilterValue, String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(FilterValue::new(key, value)),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn capabilities(config: &Config) -> Result<Capabilities> {
    let transport =
        ReqwestTransport::new(config.http_timeout()).context("Failed to build HTTP client")?;
    Ok(Capabilities::new(Arc::new(transport)))
}

/// Registry over the configured install directory, with installed modules
/// loaded.
fn open_registry(config: &Config) -> Result<Arc<ExtensionRegistry>> {
    let registry = ExtensionRegistry::from_config(config, capabilities(config)?);
    registry.discover();
    Ok(Arc::new(registry))
}

fn open_library(config: &Config) -> Result<Library> {
    let registry = open_registry(config)?;
    let store = LibraryStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open library at {}",
            config.database_path.display()
        )
    })?;
    Ok(Library::new(registry, store, &config.cache))
}

fn run_extensions(config: &Config, cmd: ExtensionsCommand) -> Result<()> {
    let registry = open_registry(config)?;

    match cmd {
        ExtensionsCommand::List => print_json(&registry.list()),
        ExtensionsCommand::Index => {
            registry.refresh_index()?;
            print_json(&registry.list_index())
        }
        ExtensionsCommand::Refresh => {
            registry.force_refresh_index()?;
            print_json(&serde_json::json!({
                "refreshed": true,
                "count": registry.list_index().len(),
            }))
        }
        ExtensionsCommand::Install { id, force } => {
            registry.refresh_index()?;
            let ext = registry.install(&id, force)?;
            print_json(ext.metadata())
        }
        ExtensionsCommand::Update { id } => {
            registry.refresh_index()?;
            let ext = registry.update(&id)?;
            print_json(ext.metadata())
        }
        ExtensionsCommand::Remove { id } => {
            registry.remove(&id)?;
            print_json(&serde_json::json!({ "removed": id }))
        }
    }
}

fn run_browse(config: &Config, cmd: BrowseCommand) -> Result<()> {
    let library = open_library(config)?;

    match cmd {
        BrowseCommand::Latest { source, page } => print_json(&library.latest(&source, page)?),
        BrowseCommand::Search {
            source,
            query,
            page,
            filters,
        } => print_json(&library.search(&source, page, &query, &filters)?),
        BrowseCommand::Manga { source, path } => print_json(&library.manga(&source, &path)?),
        BrowseCommand::Chapters { source, path } => {
            print_json(&library.chapters(&source, &path)?)
        }
        BrowseCommand::Pages { source, path } => print_json(&library.pages(&source, &path)?),
    }
}

fn run_library(config: &Config, cmd: LibraryCommand) -> Result<()> {
    match cmd {
        // Listing needs no extensions loaded.
        LibraryCommand::List => {
            let store = LibraryStore::open(&config.database_path)?;
            print_json(&store.list_manga()?)
        }
        LibraryCommand::Add { source, path } => {
            let library = open_library(config)?;
            print_json(&library.add_path(&source, &path)?)
        }
        LibraryCommand::Remove { id } => {
            let store = LibraryStore::open(&config.database_path)?;
            let removed = store.delete_manga(id)?;
            if !removed {
                anyhow::bail!("Manga {} is not in the library", id);
            }
            print_json(&serde_json::json!({ "removed": id }))
        }
        LibraryCommand::Status { id, status } => {
            let store = LibraryStore::open(&config.database_path)?;
            print_json(&store.set_reading_status(id, status)?)
        }
    }
}

fn run_index(config: &Config, cmd: IndexCommand) -> Result<()> {
    match cmd {
        IndexCommand::Build { dir, output } => {
            let output = output.unwrap_or_else(|| default_index_path(&dir));
            let registry = ExtensionRegistry::new(capabilities(config)?, &dir);
            registry.discover();

            let descriptors = registry.build_index()?;
            let document = render_index(&descriptors)?;
            std::fs::write(&output, document)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            tracing::info!(
                count = descriptors.len(),
                output = %output.display(),
                "Wrote extension index"
            );
            print_json(&descriptors)
        }
    }
}

fn default_index_path(dir: &Path) -> PathBuf {
    dir.with_extension("json")
}

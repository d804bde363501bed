use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use feedboard::config::Config;
use feedboard::feed::{AggregatedFeed, Aggregator, ImageResolver, RefreshCoordinator, RefreshOutcome};
use feedboard::relay::{self, RelayClient, RelayState};
use feedboard::store::{
    parse_csv, write_csv, Column, ColumnStore, CsvRow, FeedSource, JsonFileBackend,
};

/// Get the config directory path (~/.config/feedboard/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedboard"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedboard",
    version,
    about = "Column-based RSS/Atom dashboard fetched through a CORS relay"
)]
struct Args {
    /// Config file (default: ~/.config/feedboard/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Store(StoreCommand),
    /// Serve the CORS relay endpoint
    Relay {
        /// Listen address (default from config: 127.0.0.1:8787)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}

/// Commands that work on the column snapshot.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Fetch and print every column (or one)
    Show {
        /// Only this column
        #[arg(long, value_name = "NAME")]
        column: Option<String>,

        /// Articles printed per column
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List columns and their feed sources
    Columns,
    /// Add, remove, or rename a column
    #[command(subcommand)]
    Column(ColumnCommand),
    /// Add or remove a feed source in a column
    #[command(subcommand)]
    Feed(FeedCommand),
    /// Replace all columns with the contents of a CSV file
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Write all columns to a CSV file
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ColumnCommand {
    Add { name: String },
    Remove { name: String },
    Rename { old: String, new: String },
}

#[derive(Subcommand, Debug)]
enum FeedCommand {
    Add { column: String, url: String },
    Remove { column: String, url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?
        .with_env_overrides();

    match args.command {
        Command::Relay { bind } => run_relay(&config, bind).await,
        Command::Store(command) => {
            let mut store = open_store(&config, &config_dir.join("columns.json"))?;
            run_command(command, &config, &mut store).await
        }
    }
}

fn open_store(config: &Config, snapshot_path: &Path) -> Result<ColumnStore> {
    let backend = JsonFileBackend::new(snapshot_path);

    // Only read on first run; the store ignores the seed once a snapshot exists
    let seed = match &config.seed_csv {
        Some(path) if !snapshot_path.exists() => Some(read_csv_rows(path, config)?),
        _ => None,
    };

    ColumnStore::open(Box::new(backend), seed).with_context(|| {
        format!(
            "Failed to open column snapshot '{}'",
            snapshot_path.display()
        )
    })
}

fn read_csv_rows(path: &Path, config: &Config) -> Result<Vec<CsvRow>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CSV file '{}'", path.display()))?;
    parse_csv(&text, &config.legacy_relay_prefixes)
        .with_context(|| format!("Invalid CSV file '{}'", path.display()))
}

async fn run_command(command: StoreCommand, config: &Config, store: &mut ColumnStore) -> Result<()> {
    match command {
        StoreCommand::Show { column, limit } => show(config, store, column.as_deref(), limit).await?,
        StoreCommand::Columns => print_columns(store.columns()),
        StoreCommand::Column(ColumnCommand::Add { name }) => {
            store.add_column(&name)?;
            println!("Added column '{}'", name.trim());
        }
        StoreCommand::Column(ColumnCommand::Remove { name }) => {
            let removed = store.remove_column(&name)?;
            println!(
                "Removed column '{}' ({} feeds)",
                removed.name,
                removed.sources.len()
            );
        }
        StoreCommand::Column(ColumnCommand::Rename { old, new }) => {
            store.rename_column(&old, &new)?;
            println!("Renamed column '{}' to '{}'", old, new.trim());
        }
        StoreCommand::Feed(FeedCommand::Add { column, url }) => {
            let source = FeedSource::parse_legacy(&url, &config.legacy_relay_prefixes)?;
            let shown = source.to_string();
            store.add_source(&column, source)?;
            println!("Added {} to '{}'", shown, column);
        }
        StoreCommand::Feed(FeedCommand::Remove { column, url }) => {
            let source = FeedSource::parse_legacy(&url, &config.legacy_relay_prefixes)?;
            match store.remove_source(&column, &source)? {
                0 => println!("'{}' has no feed {}", column, source),
                n => println!("Removed {} from '{}' ({} entries)", source, column, n),
            }
        }
        StoreCommand::Import { file } => {
            let rows = read_csv_rows(&file, config)?;
            store
                .replace_from_rows(rows)
                .context("Failed to replace columns from CSV")?;
            println!(
                "Imported {} columns from {}",
                store.len(),
                file.display()
            );
        }
        StoreCommand::Export { file } => {
            std::fs::write(&file, write_csv(&store.to_rows()))
                .with_context(|| format!("Failed to write CSV file '{}'", file.display()))?;
            println!("Exported {} columns to {}", store.len(), file.display());
        }
    }
    Ok(())
}

fn build_coordinator(config: &Config) -> Result<RefreshCoordinator> {
    let client = relay::build_http_client(config.request_timeout())
        .context("Failed to build HTTP client")?;
    let relay = RelayClient::new(client, config.relay_base()?)
        .with_max_response_bytes(config.max_response_bytes);
    let images = ImageResolver::new(
        relay.clone(),
        config.placeholder_image.clone(),
        config.image_cache_capacity,
    );
    let aggregator = Aggregator::new(relay, images).with_concurrency(config.concurrency());
    Ok(RefreshCoordinator::new(aggregator))
}

async fn show(
    config: &Config,
    store: &ColumnStore,
    only: Option<&str>,
    limit: usize,
) -> Result<()> {
    let columns: Vec<&Column> = match only {
        Some(name) => vec![store
            .column(name)
            .with_context(|| format!("No column named '{name}'"))?],
        None => store.columns().iter().collect(),
    };

    if columns.is_empty() {
        println!("No columns yet. Add one with `feedboard column add <NAME>`.");
        return Ok(());
    }

    let coordinator = build_coordinator(config)?;
    let refreshes = columns
        .iter()
        .map(|column| coordinator.refresh(column.id, &column.sources));
    let outcomes = futures::future::join_all(refreshes).await;

    for (column, outcome) in columns.iter().zip(outcomes) {
        match outcome {
            RefreshOutcome::Published(feed) => print_feed(column, &feed, limit),
            RefreshOutcome::Superseded => {
                tracing::debug!(column = %column.name, "Refresh superseded, not rendering");
            }
        }
    }
    Ok(())
}

fn print_columns(columns: &[Column]) {
    if columns.is_empty() {
        println!("No columns.");
        return;
    }
    for column in columns {
        println!("{} ({} feeds)", column.name, column.sources.len());
        for source in &column.sources {
            println!("  {}", source);
        }
    }
}

fn print_feed(column: &Column, feed: &AggregatedFeed, limit: usize) {
    println!("== {} ({} articles) ==", column.name, feed.len());

    for report in feed.failed_sources() {
        if let Err(reason) = &report.outcome {
            println!("  ! skipped {}: {}", report.source, reason);
        }
    }

    for article in feed.articles.iter().take(limit) {
        let date = match article.published {
            Some(_) => article.published_or_epoch().format("%Y-%m-%d %H:%M").to_string(),
            None => "unknown date".to_string(),
        };
        println!();
        println!("  {}", article.title);
        println!("  {} | {}", article.channel_title, date);
        println!("  {}", article.link);
        println!("  image: {}", article.image_url);
        println!("  {}", article.description);
    }

    if feed.len() > limit {
        println!();
        println!("  ... {} more", feed.len() - limit);
    }
    println!();
}

async fn run_relay(config: &Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.relay.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid relay bind address '{bind}'"))?;

    let state = RelayState::new(
        relay::http_client_builder(config.request_timeout()),
        config.relay.allow_private_targets,
    )
    .context("Failed to build HTTP client")?
    .with_max_response_bytes(config.max_response_bytes);

    relay::serve(addr, state)
        .await
        .with_context(|| format!("Relay server on {addr} failed"))
}

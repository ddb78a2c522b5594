//! carddav: vCard conversion command line
//!
//! Usage:
//!   carddav import <file.vcf>                            - Convert cards to local records (JSON)
//!   carddav export <record.json> [--update <card.vcf>]   - Convert a local record to a vCard
//!   carddav --help                                       - Show help

mod commands;

use anyhow::{Context, bail};
use carddav_contacts::{CardConverter, HttpDownloader};
use carddav_core::{Config, SqliteSubtypeStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Wire → local for every card in a file
    Import { path: PathBuf },
    /// Local → wire, optionally updating an existing card
    Export {
        record: PathBuf,
        update: Option<PathBuf>,
    },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = parse_args(&args)?;

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("carddav {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging (stdout carries the converted output)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Addressbook: {}", config.addressbook.id);
    tracing::debug!("Subtype database: {}", config.database.db_path);

    let store = open_store(&config.database.db_path)?;
    let mut converter = CardConverter::from_config(&config, store)
        .map_err(|e| anyhow::anyhow!("Failed to load subtype catalog: {}", e))?;

    match mode {
        RunMode::Import { path } => {
            let downloader = HttpDownloader::new(&config.http)?;
            let output = commands::import(&path, &mut converter, &downloader).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        RunMode::Export { record, update } => {
            let card = commands::export(&record, update.as_deref(), &converter)?;
            print!("{}", card);
        }
        _ => {}
    }

    Ok(())
}

/// Parse command line arguments (program name excluded)
fn parse_args(args: &[String]) -> anyhow::Result<RunMode> {
    if args
        .iter()
        .any(|a| matches!(a.as_str(), "--help" | "-h"))
    {
        return Ok(RunMode::Help);
    }
    if args
        .iter()
        .any(|a| matches!(a.as_str(), "--version" | "-v"))
    {
        return Ok(RunMode::Version);
    }

    let mut args = args.iter();
    match args.next().map(String::as_str) {
        Some("import") => {
            let path = args.next().context("import: missing <file.vcf>")?;
            if let Some(extra) = args.next() {
                bail!("import: unexpected argument {}", extra);
            }
            Ok(RunMode::Import {
                path: PathBuf::from(path),
            })
        }
        Some("export") => {
            let record = args.next().context("export: missing <record.json>")?;
            let mut update = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--update" | "-u" => {
                        let card = args.next().context("--update: missing <card.vcf>")?;
                        update = Some(PathBuf::from(card));
                    }
                    other => bail!("export: unexpected argument {}", other),
                }
            }
            Ok(RunMode::Export {
                record: PathBuf::from(record),
                update,
            })
        }
        Some(other) => bail!("Unknown command: {} (see --help)", other),
        None => Ok(RunMode::Help),
    }
}

/// Open the vendor label database, creating its directory if needed
fn open_store(db_path: &str) -> anyhow::Result<Arc<SqliteSubtypeStore>> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let store = SqliteSubtypeStore::new(db_path)
        .map_err(|e| anyhow::anyhow!("Failed to open subtype database: {}", e))?;
    Ok(Arc::new(store))
}

/// Print help message
fn print_help() {
    println!("carddav - vCard conversion for CardDAV addressbooks");
    println!();
    println!("Usage:");
    println!("  carddav import <file.vcf>                           Print local records as JSON");
    println!("  carddav export <record.json> [--update <card.vcf>]  Print the vCard for a record");
    println!("  carddav --help                                      Show this help message");
    println!("  carddav --version                                   Show version");
    println!();
    println!("Configuration:");
    println!("  ./carddav.toml is read when present; environment variables take precedence.");
    println!();
    println!("Environment Variables:");
    println!("  CARDDAV_DB_PATH         Vendor label database (default: data/carddav.db)");
    println!("  CARDDAV_ADDRESSBOOK_ID  Addressbook identity (default: default)");
    println!("  CARDDAV_PHOTO_MAX_SIZE  Maximum cropped photo side (default: 256)");
    println!("  CARDDAV_PHOTO_CROP      Apply photo crop hints (default: true)");
    println!("  CARDDAV_BASE_URL        Base URL for relative photo references");
    println!("  CARDDAV_USERNAME        Basic auth username for photo downloads");
    println!("  CARDDAV_PASSWORD        Basic auth password for photo downloads");
    println!("  CARDDAV_TIMEOUT_SECS    HTTP timeout in seconds (default: 30)");
    println!("  RUST_LOG                Log filter (default: info)");
}

//! Schema Store Inspector
//!
//! Lists names, versions and recorded shapes of a persisted schema store.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use schema_marshal::{MarshalConfig, SchemaStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-inspect")]
#[command(about = "Inspect a persisted schema store")]
struct Cli {
    /// Path to the registry file (defaults to the configured store path)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Explicit config file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered names and their version counts
    List,

    /// Show every recorded shape of one name
    Show {
        /// Schema name
        name: String,
    },

    /// Check the file's checksum and version invariants
    Verify,

    /// Print the effective configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        MarshalConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(path) = cli.store {
        config.store.path = path;
    }

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::List => {
            let store = open(&config)?;
            for name in store.names() {
                let versions = store.entry(name).map(|e| e.len()).unwrap_or_default();
                println!("{:<32} {} version(s)", name, versions);
            }
        }

        Commands::Show { name } => {
            let store = open(&config)?;
            let entry = store
                .entry(&name)
                .with_context(|| format!("{} is not registered", name))?;
            for (version, fingerprint) in entry.history() {
                let shape = store.codec().describe(fingerprint)?;
                println!("v{}  {}", version, fingerprint.checksum().short());
                println!("{}", serde_json::to_string_pretty(&shape)?);
            }
        }

        Commands::Verify => {
            let store = open(&config)?;
            let versions: usize = store
                .names()
                .filter_map(|name| store.entry(name))
                .map(|e| e.len())
                .sum();
            println!(
                "✅ {} - {} name(s), {} version(s), checksum valid",
                store.path().display(),
                store.names().count(),
                versions
            );
        }
    }

    Ok(())
}

fn open(config: &MarshalConfig) -> anyhow::Result<SchemaStore> {
    SchemaStore::from_config(config)
        .with_context(|| format!("opening {}", config.store.path.display()))
}

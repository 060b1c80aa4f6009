use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use insight::commands;
use insight::load_reviews;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Review insight response cache tools", long_about = None)]
struct Cli {
    /// Persisted cache file
    #[arg(short, long, default_value = "./data/insight-cache.json")]
    cache_file: PathBuf,

    /// Cache configuration (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content fingerprint of a review export
    Fingerprint {
        /// JSON file with the reviews
        reviews: PathBuf,
    },

    /// Print the cache key for a review export
    Key {
        #[arg(short, long)]
        tenant: String,

        /// Backend that produces the payload
        #[arg(short, long)]
        backend: String,

        /// Payload kind (analysis, recommendations or a custom tag)
        #[arg(short, long, default_value = "analysis")]
        kind: String,

        /// JSON file with the reviews
        reviews: PathBuf,
    },

    /// Compare a review export against the last analyzed one
    Delta {
        /// Current reviews
        current: PathBuf,

        /// Reviews of the last analysis
        baseline: PathBuf,
    },

    /// List cached entries
    Inspect,

    /// Show cache statistics
    Stats,

    /// Remove expired entries
    Sweep,

    /// Remove all entries, or those whose key contains PATTERN
    Clear {
        pattern: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "insight=info,insight_cache=info".into())
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fingerprint { ref reviews } => {
            let records = load_reviews(reviews)?;
            println!("{}", commands::fingerprint_report(&records));
        }

        Commands::Key { ref tenant, ref backend, ref kind, ref reviews } => {
            let records = load_reviews(reviews)?;
            println!("{}", commands::key_report(tenant, backend, kind, &records)?);
        }

        Commands::Delta { ref current, ref baseline } => {
            let current = load_reviews(current)?;
            let baseline = load_reviews(baseline)?;
            print!("{}", commands::delta_report(&current, &baseline));
        }

        Commands::Inspect => {
            let cache = open(&cli)?;
            let lines = commands::inspect(&cache).await;
            if lines.is_empty() {
                println!("Cache is empty ({:?})", cli.cache_file);
            } else {
                println!("Cached entries:");
                for line in lines {
                    println!("  {}", line);
                }
            }
        }

        Commands::Stats => {
            let cache = open(&cli)?;
            print!("{}", commands::stats_report(&cache).await);
        }

        Commands::Sweep => {
            let cache = open(&cli)?;
            let removed = commands::sweep(&cache).await;
            println!("Removed {} expired entries", removed);
        }

        Commands::Clear { ref pattern } => {
            let cache = open(&cli)?;
            let removed = commands::clear(&cache, pattern.as_deref()).await?;
            match pattern {
                Some(pattern) => println!("Removed {} entries matching '{}'", removed, pattern),
                None => println!("Removed {} entries", removed),
            }
        }
    }

    Ok(())
}

fn open(cli: &Cli) -> Result<insight_cache::ResponseCache> {
    let config = commands::load_config(cli.config.as_deref())?;
    commands::open_cache(&cli.cache_file, config)
}

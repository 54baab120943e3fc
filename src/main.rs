mod config;
mod extractor;
mod fetcher;
mod models;
mod pipeline;
mod sources;
mod status;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::models::RefreshResponse;
use crate::pipeline::{Pipeline, RefreshError};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "carharvest", about = "Car marketplace listing harvester", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh one source and print the listings as JSON
    Refresh {
        /// Source id (see `carharvest sources`)
        #[arg(short, long)]
        source: String,

        /// Scrape even if the source is still within its freshness TTL
        #[arg(short, long)]
        force: bool,
    },

    /// Refresh every registered source
    RefreshAll {
        #[arg(short, long)]
        force: bool,
    },

    /// Print stored listings, newest scrape first
    Listings {
        /// Restrict to one source
        #[arg(short, long)]
        source: Option<String>,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show per-source scrape status
    Status,

    /// List the registered marketplaces
    Sources,

    /// Show database statistics
    Stats,

    /// Apply schema migrations without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "carharvest=info,warn",
        1 => "carharvest=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Refresh { source, force } => {
            let _t = utils::Stopwatch::begin(format!("refresh {}", source));
            let response = match Pipeline::from_config(config) {
                Ok(pipeline) => match pipeline.refresh(&source, force).await {
                    Ok(outcome) => RefreshResponse::ok(outcome.listings, outcome.cached),
                    Err(e) => RefreshResponse::err(e.to_string()),
                },
                Err(e) => RefreshResponse::err(e.to_string()),
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.success {
                std::process::exit(1);
            }
        }

        Command::RefreshAll { force } => {
            let _t = utils::Stopwatch::begin("refresh of all sources");
            let pipeline = match Pipeline::from_config(config) {
                Ok(p) => Arc::new(p),
                Err(e @ RefreshError::MissingApiKey) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            };

            let stats = pipeline.refresh_all(force).await;
            info!(
                "Done: {} scraped, {} cached, {} listings, {} errors",
                stats.scraped, stats.cached, stats.listings, stats.errors
            );
        }

        Command::Listings { source, limit } => {
            let repo = Repository::open(&config.storage.db_path)?;
            let listings = repo.read_fresh(source.as_deref(), limit)?;
            if listings.is_empty() {
                println!("No listings — run `carharvest refresh --source <id>` first.");
            } else {
                for l in &listings {
                    println!(
                        "{:<12} {:<11} {:>4} {:>12}  {:<10} {}",
                        l.brand,
                        l.model,
                        l.year,
                        utils::fmt_price(l.price),
                        l.location.as_deref().unwrap_or("—"),
                        l.title,
                    );
                }
                println!("{} listings", listings.len());
            }
        }

        Command::Status => {
            let repo = Repository::open(&config.storage.db_path)?;
            let statuses = repo.list_statuses()?;
            if statuses.is_empty() {
                println!("No sources scraped yet.");
            }
            for st in &statuses {
                println!(
                    "{:<12} {:<10} last: {:<20} count: {:<5} {}",
                    st.source,
                    st.status.as_str(),
                    st.last_scraped_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "never".into()),
                    st.last_listing_count.unwrap_or(0),
                    st.last_error.as_deref().unwrap_or(""),
                );
            }
        }

        Command::Sources => {
            for src in sources::all() {
                println!("{:<12} {:<3} {}", src.name, src.country, src.search_url);
            }
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let total = repo.listing_count()?;
            let by_source = repo.count_by_source()?;
            println!("─────────────────────────────────");
            println!("  carharvest — Database Stats");
            println!("─────────────────────────────────");
            println!("  Listings : {}", utils::fmt_count(total));
            for (source, count) in &by_source {
                println!("  {:<9}: {}", source, utils::fmt_count(*count));
            }
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

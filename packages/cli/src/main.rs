#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for the film walk crawler.
//!
//! ```text
//! film_walk crawl [--config film_walk.toml] [--db data/film_walk.duckdb] [--max-handles 500]
//! film_walk export --user alice [--out alice.csv]
//! film_walk index [--out user_index.csv]
//! film_walk stats
//! ```
//!
//! Logging goes through [`film_walk_cli_utils::init_logger`], so the crawl
//! spinner and log lines share the terminal. Set `RUST_LOG=info` to see
//! per-user progress and periodic statistics reports.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use film_walk_cli_utils::IndicatifProgress;
use film_walk_crawler::{Crawler, CrawlerConfig};
use film_walk_database::store::DiaryStore;
use film_walk_database::{diary_db, export, paths};
use film_walk_scraper::fetch::HttpFetcher;
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Parser)]
#[command(name = "film_walk", about = "Random-walk film diary crawler")]
struct Cli {
    /// Crawl database (defaults to `data/film_walk.duckdb`, or `db_path`
    /// from the crawl config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the site and store every newly discovered user's diary
    Crawl {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many handles (runs forever if omitted)
        #[arg(long)]
        max_handles: Option<u64>,
        /// Processed handles between commits
        #[arg(long)]
        commit_every: Option<u64>,
        /// Processed handles between statistics reports
        #[arg(long)]
        report_every: Option<u64>,
        /// Seed for the random walk (random if omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Export one user's stored diary as `date,movie_url,rating` CSV
    Export {
        /// Username to export
        #[arg(long)]
        user: String,
        /// Output file (defaults to `data/exports/diary/<user>.csv`)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export per-user counts and average rating for every stored user
    Index {
        /// Output file (defaults to `data/exports/user_index.csv`)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print store totals
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = film_walk_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            config,
            max_handles,
            commit_every,
            report_every,
            seed,
        } => {
            let mut config = match config {
                Some(path) => CrawlerConfig::load(&path)?,
                None => CrawlerConfig::default(),
            };
            if let Some(db) = cli.db {
                config.db_path = Some(db);
            }
            if let Some(n) = commit_every {
                config.commit_every = n;
            }
            if let Some(n) = report_every {
                config.report_every = n;
            }
            config.validate()?;

            let db_path = config.db_path.clone().unwrap_or_else(paths::crawler_db_path);
            let store = open_store(&db_path)?;
            let fetcher =
                HttpFetcher::new(&config.user_agent, config.request_timeout(), config.retry)?;
            let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

            log::info!("Crawling {} into {}", config.base_url, db_path.display());

            let progress = IndicatifProgress::crawl_spinner(&multi, "starting");
            let mut crawler = Crawler::new(&config, fetcher, rng, store)?.with_progress(progress);
            let report = crawler.run(max_handles).await?;

            println!(
                "Processed {} handles: {} new, {} known, {} failed; {} diaries ingested",
                report.processed,
                report.new_users,
                report.known_users,
                report.failed,
                report.diaries_this_run,
            );
        }
        Commands::Export { user, out } => {
            let store = open_store(&db_path(cli.db))?;
            let out = out.unwrap_or_else(|| paths::diary_export_path(&user));
            let count = export::export_user_diary(store.connection(), &user, &out)?;
            if count == 0 {
                eprintln!("No diaries stored for {user}");
            }
            println!("{count} diaries written to {}", out.display());
        }
        Commands::Index { out } => {
            let store = open_store(&db_path(cli.db))?;
            let out = out.unwrap_or_else(paths::user_index_path);
            let count = export::export_user_index(store.connection(), &out)?;
            println!("{count} users written to {}", out.display());
        }
        Commands::Stats => {
            let store = open_store(&db_path(cli.db))?;
            let conn = store.connection();
            println!("Users:   {}", diary_db::get_user_count(conn)?);
            println!("Movies:  {}", diary_db::get_movie_count(conn)?);
            println!("Diaries: {}", diary_db::get_diary_count(conn)?);
        }
    }

    Ok(())
}

fn db_path(db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(paths::crawler_db_path)
}

fn open_store(path: &Path) -> Result<DiaryStore, Box<dyn std::error::Error>> {
    log::debug!("Opening store at {}", path.display());
    Ok(DiaryStore::open(path)?)
}

//! Booru-Harvest main entry point
//!
//! This is the command-line interface for the Booru-Harvest artist harvester.

use anyhow::Context;
use booru_harvest::config::{load_config_with_hash, Config};
use booru_harvest::crawler::{CrawlManager, CrawlReport};
use booru_harvest::output::{generate_summary, print_artists, print_rate_limit_status, print_statistics};
use booru_harvest::storage::{open_storage, ArtistFilter, SqliteStorage, Storage};
use booru_harvest::CrawlState;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Booru-Harvest: an adaptive, rate-limited artist metadata harvester
///
/// Booru-Harvest walks the paginated artist listing of a booru-style API,
/// backs off when the server throttles it and stores every artist in a
/// local SQLite database that can be searched afterwards.
#[derive(Parser, Debug)]
#[command(name = "booru-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An adaptive, rate-limited artist metadata harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Zero-based page index to start from
    #[arg(long, default_value_t = 0)]
    start_page: u64,

    /// Number of pages to fetch (default: until the listing is exhausted)
    #[arg(long)]
    max_pages: Option<u64>,

    /// Continue the latest unfinished run where it left off (overrides --start-page)
    #[arg(long)]
    resume: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "search"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "search"])]
    stats: bool,

    /// Search stored artists and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    search: bool,

    /// Only artists whose name starts with this prefix
    #[arg(long, requires = "search")]
    name_prefix: Option<String>,

    /// Only artists whose name or aliases contain this text
    #[arg(long, requires = "search")]
    name_contains: Option<String>,

    /// Only artists with at least this many posts
    #[arg(long, requires = "search")]
    min_posts: Option<i64>,

    /// Only artists with at most this many posts
    #[arg(long, requires = "search")]
    max_posts: Option<i64>,

    /// Maximum number of search results
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(1..=1000))]
    limit: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.search {
        handle_search(&config, &cli)
    } else {
        handle_crawl(config, config_hash, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("booru_harvest=info,warn"),
            1 => EnvFilter::new("booru_harvest=debug,info"),
            2 => EnvFilter::new("booru_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    open_storage(path).with_context(|| format!("failed to open database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    println!("=== Booru-Harvest Dry Run ===\n");

    println!("API:");
    println!("  Endpoint: {}", config.api.base_url);
    println!("  Page size: {}", config.api.page_size);
    println!("  Timeout: {}s", config.api.timeout_secs);
    println!(
        "  Authentication: {}",
        match config.api.credentials() {
            Some((user, _)) => format!("basic auth as {}", user),
            None => "none".to_string(),
        }
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    let rate = &config.rate_limit;
    println!("\nRate Limiting:");
    println!(
        "  Interval: {}ms (ceiling {}ms)",
        rate.base_interval_ms, rate.max_interval_ms
    );
    println!(
        "  Escalate after {} throttles, recover after {} successes",
        rate.escalation_threshold, rate.recovery_threshold
    );
    println!(
        "  Cooldown: {}s + {}s per throttle, at most {}s",
        rate.cooldown_base_secs, rate.cooldown_step_secs, rate.cooldown_max_secs
    );
    println!("  Max single wait: {:.0}s", rate.max_wait_secs);

    println!("\nCrawler:");
    println!("  Attempts per page: {}", config.crawler.max_attempts);
    println!(
        "  Stop after {} consecutive empty pages",
        config.crawler.max_consecutive_empty
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    let first = format!("{}{}", config.api.page_prefix, cli.start_page);
    match cli.max_pages {
        Some(n) => println!(
            "✓ Would fetch {} pages starting at {}{}",
            n,
            first,
            if cli.resume { " (or resume the latest run)" } else { "" }
        ),
        None => println!("✓ Would fetch from {} until the listing is exhausted", first),
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let summary = generate_summary(&storage)?;
    print_statistics(&summary);

    Ok(())
}

/// Handles the --search mode: prints artists matching the filter flags
fn handle_search(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let storage = open_database(config)?;

    let filter = ArtistFilter {
        name_starts_with: cli.name_prefix.clone(),
        name_contains: cli.name_contains.clone(),
        min_post_count: cli.min_posts,
        max_post_count: cli.max_posts,
    };
    let artists = storage
        .query_artists(&filter, cli.limit as usize)
        .context("artist search failed")?;
    print_artists(&artists);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, cli: &Cli) -> anyhow::Result<()> {
    let storage = open_database(&config)?;

    let (start_page, max_pages) = if cli.resume {
        match storage.get_latest_run()? {
            Some(run) if run.is_resumable() => {
                if run.config_hash != config_hash {
                    tracing::warn!("Configuration changed since run {}", run.id);
                }
                tracing::info!(
                    "Resuming run {} ({}) at page {}",
                    run.id,
                    run.status,
                    run.resume_page()
                );
                (run.resume_page(), run.remaining_pages())
            }
            Some(run) => {
                tracing::info!(
                    "Latest run {} is {}, nothing to resume; starting at page {}",
                    run.id,
                    run.status,
                    cli.start_page
                );
                (cli.start_page, cli.max_pages)
            }
            None => {
                tracing::info!("No previous runs found, starting new run");
                (cli.start_page, cli.max_pages)
            }
        }
    } else {
        (cli.start_page, cli.max_pages)
    };

    let manager = Arc::new(CrawlManager::new(config, config_hash, storage)?);

    let interrupt = Arc::clone(&manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            interrupt.stop();
        }
    });

    let run_id = manager.start(start_page, max_pages)?;
    tracing::info!("Crawl run {} started", run_id);

    let outcome = manager.wait().await;
    println!();
    print_rate_limit_status(&manager.rate_limit_status());

    match outcome {
        Ok(Some(report)) => {
            print_report(&report);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e).with_context(|| format!("crawl run {} failed", run_id))
        }
    }
}

fn print_report(report: &CrawlReport) {
    println!("\n=== Crawl {} ===", report.state);
    println!("  {}", report.message);
    println!("  Pages processed: {}", report.pages_processed);
    println!("  Records saved: {}", report.records_saved);
    if report.state == CrawlState::Stopped {
        println!("  Resume with --resume (next page {})", report.next_page);
    }
}

//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest product crawler.

use anyhow::Context;
use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::crawler::{crawl, CrawlOptions, RunMode};
use catalog_harvest::output::{
    export_feed, generate_markdown_summary, generate_summary, load_statistics, print_statistics,
};
use catalog_harvest::storage::SqliteStorage;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a product catalog crawler
///
/// Catalog-Harvest walks the category listings of a catalog shop, follows
/// pagination, and stores one structured record per product page.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A product catalog crawler", long_about = None)]
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

    /// Resume an interrupted crawl; fail if there is none
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, forgetting visited pages (stored products are kept)
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary", "export_feed"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "export_feed"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_feed"])]
    export_summary: bool,

    /// Rewrite the JSON Lines feed from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    export_feed: bool,
}

impl Cli {
    fn run_mode(&self) -> RunMode {
        if self.fresh {
            RunMode::Fresh
        } else if self.resume {
            RunMode::Resume
        } else {
            RunMode::Auto
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else if cli.export_feed {
        handle_export_feed(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.run_mode()).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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
    SqliteStorage::new(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Download delay: {}ms", config.crawler.download_delay);
    println!(
        "  Max domain requests: {}",
        config.crawler.max_domain_requests
    );
    println!(
        "  Retries: {} (delay {}ms, 429 cooldown {}ms)",
        config.crawler.max_retries, config.crawler.retry_delay, config.crawler.rate_limit_cooldown
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSite:");
    println!("  Allowed domains: {}", config.site.allowed_domains.join(", "));
    println!("  Obey robots.txt: {}", config.site.obey_robots);
    println!("  Cookies: {}", config.site.cookies.len());
    for name in config.site.cookies.keys() {
        println!("    * {}", name);
    }

    println!("\nStart URLs ({}):", config.site.start_urls.len());
    for url in &config.site.start_urls {
        println!("  - {}", url);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(feed) = &config.output.feed_path {
        println!("  Feed: {}", feed);
    }
    println!("  Summary: {}", config.output.summary_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling from {} listing pages",
        config.site.start_urls.len()
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = open_database(config)?;

    tracing::info!("Loading crawl data from database...");
    let summary = generate_summary(&storage).context("Failed to build summary")?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))
        .with_context(|| format!("Failed to write {}", config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Handles the --export-feed mode: rewrites the JSON Lines feed
fn handle_export_feed(config: &Config) -> anyhow::Result<()> {
    let feed_path = config
        .output
        .feed_path
        .as_deref()
        .context("No feed-path is configured in [output]")?;

    let storage = open_database(config)?;
    let written = export_feed(&storage, Path::new(feed_path))
        .with_context(|| format!("Failed to write {}", feed_path))?;

    println!("✓ Exported {} products to: {}", written, feed_path);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, mode: RunMode) -> anyhow::Result<()> {
    match mode {
        RunMode::Fresh => tracing::info!("Starting fresh crawl (ignoring previous state)"),
        RunMode::Resume => tracing::info!("Resuming interrupted crawl"),
        RunMode::Auto => {
            tracing::info!("Starting crawl (will resume if interrupted run exists)")
        }
    }

    tracing::info!(
        "Allowed domains: {}, start URLs: {}",
        config.site.allowed_domains.join(", "),
        config.site.start_urls.len()
    );

    let report = crawl(config, config_hash, CrawlOptions { mode })
        .await
        .context("Crawl failed")?;

    tracing::info!(
        "Run {} finished: {} listings, {} products, {} failed pages",
        report.run_id,
        report.listings_processed,
        report.products_extracted,
        report.pages_failed
    );

    Ok(())
}

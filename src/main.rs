//! CLI entry point for the turbocrawl tool.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, warn};

use turbocrawl_core::checkpoint::CheckpointStore;
use turbocrawl_core::config::CrawlConfig;
use turbocrawl_core::crawl::{
    CrawlEngine, CrawlOutcome, EngineOptions, ItemWorker, PageDiscoverer,
};
use turbocrawl_core::fetch::{Fetcher, FetcherConfig, ProxyPool, RateLimiter, RetryPolicy};
use turbocrawl_core::sink::{JsonFileSink, RecordSink};
use turbocrawl_core::site::TurboDetailExtractor;

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    // Validate configuration; bad config is fatal before any work starts.
    let (base_url, proxies) =
        CrawlConfig::validate(&args.base_url, args.start_page, args.end_page, &args.proxy)?;

    let config = CrawlConfig {
        base_url,
        start_page: args.start_page,
        end_page: args.end_page,
        concurrency: usize::from(args.concurrency),
        max_attempts: u32::from(args.max_retries),
        retry_base_delay: Duration::from_millis(args.retry_delay),
        request_delay: Duration::from_millis(args.rate_limit),
        timeout: Duration::from_secs(args.timeout),
        accept_invalid_certs: args.insecure,
        proxies,
        checkpoint_path: PathBuf::from(&args.checkpoint),
        checkpoint_every: args.checkpoint_every as usize,
        output_path: PathBuf::from(&args.output),
    };

    info!(
        pages = format!("{}..={}", config.start_page, config.end_page),
        concurrency = config.concurrency,
        checkpoint = %config.checkpoint_path.display(),
        "turbocrawl starting"
    );

    let pool = Arc::new(ProxyPool::new(config.proxies.clone()));
    match pool.len() {
        0 => info!("no proxy configured, using direct connection"),
        1 => info!(proxy = %pool.endpoints()[0], "using proxy"),
        n => info!(proxies = n, first = %pool.endpoints()[0], "proxy rotation enabled"),
    }

    let fetcher_config = FetcherConfig {
        timeout: config.timeout,
        accept_invalid_certs: config.accept_invalid_certs,
        ..FetcherConfig::default()
    };
    let fetcher = Fetcher::new(&fetcher_config, Arc::clone(&pool))?;

    let retry = RetryPolicy::new(config.max_attempts, config.retry_base_delay);
    let limiter = Arc::new(if config.request_delay.is_zero() {
        debug!("rate limiting disabled");
        RateLimiter::disabled()
    } else {
        RateLimiter::new(config.request_delay)
    });

    let discoverer = PageDiscoverer::new(
        fetcher.clone(),
        retry.clone(),
        Arc::clone(&pool),
        Arc::clone(&limiter),
        config.base_url.clone(),
    );
    let worker = ItemWorker::new(
        fetcher,
        retry,
        Arc::clone(&pool),
        limiter,
        config.base_url.clone(),
        Arc::new(TurboDetailExtractor),
    );
    let store = CheckpointStore::new(&config.checkpoint_path);

    let engine = CrawlEngine::new(
        discoverer,
        worker,
        store,
        EngineOptions {
            start_page: config.start_page,
            end_page: config.end_page,
            concurrency: config.concurrency,
            checkpoint_every: config.checkpoint_every,
        },
    )?;

    // An interrupt stops new work from being admitted; in-flight fetches
    // finish and land in the final checkpoint.
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work and saving progress");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let report = engine.run(interrupted).await?;

    if report.records.is_empty() {
        info!("no records to export");
    } else {
        let sink = JsonFileSink::new(&config.output_path);
        sink.write(&report.records).await?;
    }

    if report.outcome == CrawlOutcome::Interrupted {
        info!("run interrupted; rerun with the same flags to resume");
    }

    info!(
        pages_discovered = report.pages_discovered,
        items_completed = report.items_completed,
        items_pending = report.items_pending,
        items_failed = report.items_failed,
        rotations = pool.rotations(),
        "crawl summary"
    );

    Ok(())
}

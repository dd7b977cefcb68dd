//! The crawl subcommand.

use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use crate::config::CrawlConfig;
use crate::engine::CrawlEngine;
use crate::repository::CrawlStore;

#[derive(clap::Args)]
pub struct CrawlArgs {
    /// Seed URLs; may be empty when resuming an existing database
    pub urls: Vec<String>,

    /// Worker count
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,

    /// Per-host delay between requests, in seconds
    #[arg(long)]
    delay: Option<f64>,

    /// HTTP request timeout, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Stop after this many crawled pages (0 = unlimited)
    #[arg(short, long)]
    limit: Option<u64>,

    /// User agent sent with every request
    #[arg(long, env = "LINKMAP_USER_AGENT")]
    user_agent: Option<String>,

    /// Skip robots.txt checks
    #[arg(long)]
    ignore_robots: bool,

    /// Follow links to hosts outside the seed set
    #[arg(long)]
    follow_external: bool,

    /// Only admit URLs matching this pattern (repeatable)
    #[arg(long = "include", value_name = "PATTERN")]
    include: Vec<String>,

    /// Never admit URLs matching this pattern (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Extra request header as "Name: Value" (repeatable)
    #[arg(long = "header", value_name = "HEADER")]
    headers: Vec<String>,
}

impl CrawlArgs {
    /// Overlay the flags that were actually given onto the file config.
    fn apply(self, config: &mut CrawlConfig) {
        if !self.urls.is_empty() {
            config.seed_urls = self.urls;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(delay) = self.delay {
            config.request_delay = delay;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = timeout;
        }
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if self.ignore_robots {
            config.ignore_robots = true;
        }
        if self.follow_external {
            config.follow_external_hosts = true;
        }
        config.include_patterns.extend(self.include);
        config.exclude_patterns.extend(self.exclude);
        config.headers.extend(self.headers);
    }
}

pub async fn run(mut config: CrawlConfig, args: CrawlArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let store = Arc::new(
        CrawlStore::open(&config.database_path).with_context(|| {
            format!("opening store at {}", config.database_path.display())
        })?,
    );

    let seeds = config.seed_urls.clone();
    if seeds.is_empty() && !store.has_queued_items()? {
        anyhow::bail!("no seed URLs given and no pending work to resume");
    }

    let engine = Arc::new(CrawlEngine::new(config, store.clone())?);

    let interrupt_handle = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping crawl");
            interrupt_handle.stop();
        }
    });

    engine.start(&seeds).await?;

    let stats = engine.stats().await;
    let counts = store.queue_counts()?;
    println!(
        "crawled {} pages ({} errors); queue now {} queued / {} completed / {} error",
        stats.pages_crawled, stats.error_count, counts.queued, counts.completed, counts.error
    );
    Ok(())
}

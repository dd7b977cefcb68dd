//! Crawl coordination: the worker pool, admission, termination, and stats.

mod admission;
mod stats;

pub use admission::UrlAdmission;
pub use stats::CrawlStats;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, CrawlConfig};
use crate::fetcher::{FetchError, HttpFetcher};
use crate::models::{ErrorKind, LinkData};
use crate::processor::PageProcessor;
use crate::rate_limit::HostRateLimiter;
use crate::repository::{CrawlStore, QueueItem};
use crate::robots::RobotsGate;

/// Cadence of the queue status report.
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Floor on the stale-claim timeout handed to the janitor.
const MIN_STALE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] crate::repository::StoreError),
    #[error("crawl cancelled")]
    Cancelled,
}

struct EngineInner {
    config: CrawlConfig,
    store: Arc<CrawlStore>,
    robots: RobotsGate,
    limiter: HostRateLimiter,
    processor: PageProcessor,
    admission: UrlAdmission,
    stats: RwLock<CrawlStats>,
    active_workers: Mutex<usize>,
}

/// The crawl coordinator.
///
/// Owns N worker tasks that claim rows from the store, run them through
/// the robots gate, rate limiter, and page processor, and commit results
/// back. Termination is a property of the queue: a worker exits once it
/// observes an empty queue after at least one page has been crawled.
pub struct CrawlEngine {
    inner: Arc<EngineInner>,
    cancel: CancellationToken,
}

impl CrawlEngine {
    pub fn new(config: CrawlConfig, store: Arc<CrawlStore>) -> Result<Self, EngineError> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        let robots = RobotsGate::new(fetcher.clone(), &config.user_agent, config.ignore_robots);
        let limiter = HostRateLimiter::new(config.request_delay());
        let processor = PageProcessor::new(fetcher, &config.allowed_schemes);
        let admission = UrlAdmission::from_config(&config)?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                robots,
                limiter,
                processor,
                admission,
                stats: RwLock::new(CrawlStats::new()),
                active_workers: Mutex::new(0),
            }),
            cancel: CancellationToken::new(),
        })
    }

    /// Request a cooperative shutdown; `start` returns with a
    /// cancellation error once the workers have wound down.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Snapshot of the run counters.
    pub async fn stats(&self) -> CrawlStats {
        self.inner.stats.read().await.clone()
    }

    /// Run the crawl to completion.
    ///
    /// Seeds the queue, spawns the workers and the stats reporter, and
    /// waits for natural completion or cancellation.
    pub async fn start(&self, seed_urls: &[String]) -> Result<(), EngineError> {
        let inner = &self.inner;

        // Reclaim rows stranded in processing by a previous crash.
        let stale_timeout = (inner.config.request_timeout() * 2).max(MIN_STALE_TIMEOUT);
        let reclaimed = inner.store.cleanup_stale_processing(stale_timeout)?;
        if reclaimed > 0 {
            info!("requeued {} stale processing rows", reclaimed);
        }
        inner
            .store
            .set_meta("crawl_started_at", &chrono::Utc::now().to_rfc3339())?;

        let mut seeds = seed_urls.to_vec();
        if inner.config.limit > 0 && seeds.len() as u64 > inner.config.limit {
            seeds.truncate(inner.config.limit as usize);
        }
        let admitted = inner.store.add_to_queue(&seeds)?;
        info!(
            "starting crawl: {} seeds admitted, concurrency {}",
            admitted, inner.config.concurrency
        );

        // Workers and the reporter share an ambient token; the last worker
        // out cancels it so the reporter stops with them.
        let ambient = self.cancel.child_token();
        {
            let mut active = inner.active_workers.lock().await;
            *active = inner.config.concurrency;
        }

        let mut workers = Vec::with_capacity(inner.config.concurrency);
        for id in 0..inner.config.concurrency {
            let inner = inner.clone();
            let ambient = ambient.clone();
            workers.push(tokio::spawn(worker_loop(id, inner, ambient)));
        }
        let reporter = tokio::spawn(stats_reporter(inner.clone(), ambient));

        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                warn!("worker task failed: {e}");
            }
        }
        if let Err(e) = reporter.await {
            warn!("stats reporter task failed: {e}");
        }

        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        inner
            .store
            .set_meta("crawl_finished_at", &chrono::Utc::now().to_rfc3339())?;

        let stats = self.stats().await;
        info!(
            "crawl complete: {} pages, {} errors",
            stats.pages_crawled, stats.error_count
        );
        Ok(())
    }
}

impl EngineInner {
    async fn pages_crawled(&self) -> u64 {
        self.stats.read().await.pages_crawled
    }

    async fn bump_crawled(&self) {
        self.stats.write().await.pages_crawled += 1;
    }

    async fn bump_errors(&self) {
        self.stats.write().await.error_count += 1;
    }
}

/// One worker: claim, gate, wait, process, commit, repeat.
async fn worker_loop(id: usize, inner: Arc<EngineInner>, ambient: CancellationToken) {
    let delay = inner.config.request_delay();

    loop {
        if ambient.is_cancelled() {
            debug!("worker {id}: cancelled");
            break;
        }
        if inner.config.limit > 0 && inner.pages_crawled().await >= inner.config.limit {
            debug!("worker {id}: page limit reached");
            break;
        }

        let item = match inner.store.next_queued() {
            Ok(Some(item)) => item,
            Ok(None) => {
                // An empty queue only terminates a worker once something
                // has been crawled; before that it may simply mean the
                // seeds have not landed yet.
                if inner.pages_crawled().await > 0 {
                    debug!("worker {id}: queue drained");
                    break;
                }
                sleep_delay(&ambient, delay).await;
                continue;
            }
            Err(e) => {
                warn!("worker {id}: claim failed: {e}");
                sleep_delay(&ambient, delay).await;
                continue;
            }
        };
        debug!("worker {id}: processing {}", item.url);

        if !inner.robots.is_allowed(&ambient, &item.url).await {
            if let Err(e) =
                inner
                    .store
                    .save_page_error(item.id, ErrorKind::RobotsDisallowed, "disallowed by robots.txt")
            {
                warn!("worker {id}: failed to record robots denial for {}: {e}", item.url);
            }
            inner.bump_errors().await;
            sleep_delay(&ambient, delay).await;
            continue;
        }
        // Honor an advertised crawl delay for this host from now on.
        if let Some(host) = HostRateLimiter::host_of(&item.url) {
            let advertised = inner.robots.crawl_delay(&host).await;
            if advertised > Duration::ZERO {
                inner.limiter.set_domain_delay(&host, advertised).await;
            }
        }

        if inner.limiter.wait(&ambient, &item.url).await.is_err() {
            break;
        }

        let result = inner.processor.process(&ambient, &item.url).await;

        if let Some(page) = &result.page {
            if let Err(e) = inner.store.save_page_result(item.id, page) {
                // The row stays in processing; the janitor reclaims it.
                warn!("worker {id}: failed to save result for {}: {e}", item.url);
                sleep_delay(&ambient, delay).await;
                continue;
            }
            inner.bump_crawled().await;

            if let Err(e) = commit_links(&inner, &item, &result.links) {
                warn!("worker {id}: failed to save links for {}: {e}", item.url);
                sleep_delay(&ambient, delay).await;
                continue;
            }
        } else if let Some(error) = &result.error {
            if error.kind == ErrorKind::Cancelled {
                break;
            }
            if let Err(e) = inner
                .store
                .save_page_error(item.id, error.kind, &error.message)
            {
                warn!("worker {id}: failed to record error for {}: {e}", item.url);
            }
            if let Err(e) = inner.store.log_error(&item.url, error.kind, &error.message) {
                warn!("worker {id}: failed to append error log for {}: {e}", item.url);
            }
            inner.bump_errors().await;
            sleep_delay(&ambient, delay).await;
            continue;
        }

        // Politeness between iterations, independent of the per-host
        // limiter: the next claim may target a different host.
        sleep_delay(&ambient, delay).await;
    }

    // Tail position: the last worker out stops the stats reporter.
    let mut active = inner.active_workers.lock().await;
    *active = active.saturating_sub(1);
    if *active == 0 {
        ambient.cancel();
    }
}

/// Persist discovered links and enqueue the admissible ones.
///
/// Links are filtered through the admission predicate first, so neither
/// the graph nor the queue picks up URLs the crawl is not allowed to
/// visit.
fn commit_links(
    inner: &EngineInner,
    item: &QueueItem,
    links: &[LinkData],
) -> Result<(), crate::repository::StoreError> {
    if links.is_empty() {
        return Ok(());
    }

    let admitted: Vec<LinkData> = links
        .iter()
        .filter(|link| inner.admission.is_admissible(&link.target_url))
        .cloned()
        .collect();
    if admitted.is_empty() {
        debug!("no admissible links on {}", item.url);
        return Ok(());
    }

    // Compute the genuinely new URLs before save_links creates endpoint
    // rows for the whole batch.
    let mut seen = HashSet::new();
    let fresh: Vec<String> = admitted
        .iter()
        .map(|link| link.target_url.clone())
        .filter(|url| seen.insert(url.clone()))
        .filter(|url| inner.store.url_status(url).is_none())
        .collect();

    inner.store.save_links(&admitted)?;
    let enqueued = inner.store.add_to_queue(&fresh)?;
    debug!(
        "{}: {} links saved, {} new urls enqueued",
        item.url,
        admitted.len(),
        enqueued
    );
    Ok(())
}

async fn sleep_delay(ambient: &CancellationToken, delay: Duration) {
    tokio::select! {
        biased;
        _ = ambient.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}

/// Periodic queue status report.
async fn stats_reporter(inner: Arc<EngineInner>, ambient: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = ambient.cancelled() => break,
            _ = tokio::time::sleep(STATS_INTERVAL) => {}
        }

        let stats = inner.stats.read().await.clone();
        match inner.store.queue_counts() {
            Ok(counts) => info!(
                "queue: {} queued, {} processing, {} completed, {} error ({} crawled, {} errors this run)",
                counts.queued,
                counts.processing,
                counts.completed,
                counts.error,
                stats.pages_crawled,
                stats.error_count
            ),
            Err(e) => warn!("queue status unavailable: {e}"),
        }
    }
}

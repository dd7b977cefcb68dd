//! Crawl run statistics.

use chrono::{DateTime, Utc};

/// Counters for the current run.
///
/// `pages_crawled` and `error_count` are monotone; readers receive a
/// snapshot.
#[derive(Debug, Clone)]
pub struct CrawlStats {
    pub pages_crawled: u64,
    pub error_count: u64,
    pub start_time: DateTime<Utc>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            pages_crawled: 0,
            error_count: 0,
            start_time: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.start_time
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

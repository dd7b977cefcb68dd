//! Page lifecycle, fetch results, and queue bookkeeping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{LinkData, PageError};

/// Lifecycle status of a page row in the store.
///
/// The status column is the work queue: `Queued` rows are pending work,
/// `Processing` rows are claimed by a worker, and the two terminal states
/// hold results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Queued => "queued",
            PageStatus::Processing => "processing",
            PageStatus::Completed => "completed",
            PageStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(PageStatus::Queued),
            "processing" => Some(PageStatus::Processing),
            "completed" => Some(PageStatus::Completed),
            "error" => Some(PageStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch-result fields written to a page row when it completes.
///
/// `url` is the identity of the queue row (the requested URL), not the
/// final URL after redirects. Header keys are lowercased; multi-value
/// headers are collapsed to their first value.
#[derive(Debug, Clone, Default)]
pub struct PageData {
    pub url: String,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    pub meta_desc: Option<String>,
    pub meta_robots: Option<String>,
    pub canonical_url: Option<String>,
    pub content_hash: Option<String>,
    pub ttfb_ms: Option<i64>,
    pub download_time_ms: Option<i64>,
    pub response_size: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl PageData {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// Outcome of processing one URL: page data, discovered links, and an
/// optional terminal error record.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub page: Option<PageData>,
    pub links: Vec<LinkData>,
    pub error: Option<PageError>,
}

impl PageResult {
    /// A result carrying only an error, with no page and no links.
    pub fn from_error(error: PageError) -> Self {
        Self {
            page: None,
            links: Vec::new(),
            error: Some(error),
        }
    }
}

/// A full page row as persisted in the store.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub url: String,
    pub status: PageStatus,
    pub added_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    pub meta_desc: Option<String>,
    pub meta_robots: Option<String>,
    pub canonical_url: Option<String>,
    pub content_hash: Option<String>,
    pub ttfb_ms: Option<i64>,
    pub download_time_ms: Option<i64>,
    pub response_size: Option<i64>,
    pub headers: HashMap<String, String>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub last_error_type: Option<String>,
    pub last_error_message: Option<String>,
}

/// Aggregate row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub error: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.queued + self.processing + self.completed + self.error
    }
}

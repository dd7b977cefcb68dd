//! Row mapping helpers.

use rusqlite::Row;

use super::{parse_datetime, parse_headers};
use crate::models::{PageRecord, PageStatus};

/// Column list matching `row_to_page_record`.
pub(crate) const PAGE_COLUMNS: &str = "\
    id, url, status, added_at, processing_started_at, \
    status_code, title, meta_desc, meta_robots, canonical_url, \
    content_hash, ttfb_ms, download_time_ms, response_size, \
    headers_json, crawled_at, retry_count, \
    last_error_type, last_error_message";

/// Map a row selected with `PAGE_COLUMNS` into a `PageRecord`.
pub(crate) fn row_to_page_record(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    let status: String = row.get(2)?;
    let added_at: String = row.get(3)?;
    let started: Option<String> = row.get(4)?;
    let crawled: Option<String> = row.get(15)?;
    Ok(PageRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        status: PageStatus::parse(&status).unwrap_or(PageStatus::Queued),
        added_at: parse_datetime(&added_at).unwrap_or(chrono::DateTime::UNIX_EPOCH),
        processing_started_at: started.as_deref().and_then(parse_datetime),
        status_code: row.get(5)?,
        title: row.get(6)?,
        meta_desc: row.get(7)?,
        meta_robots: row.get(8)?,
        canonical_url: row.get(9)?,
        content_hash: row.get(10)?,
        ttfb_ms: row.get(11)?,
        download_time_ms: row.get(12)?,
        response_size: row.get(13)?,
        headers: parse_headers(row.get(14)?),
        crawled_at: crawled.as_deref().and_then(parse_datetime),
        retry_count: row.get(16)?,
        last_error_type: row.get(17)?,
        last_error_message: row.get(18)?,
    })
}

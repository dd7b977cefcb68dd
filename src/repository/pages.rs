//! Page result persistence and lookups.

use rusqlite::params;

use super::helpers::{row_to_page_record, PAGE_COLUMNS};
use super::{now_str, to_option, CrawlStore, Result, StoreError};
use crate::models::{ErrorKind, PageData, PageRecord, PageStatus};

impl CrawlStore {
    /// Transition a claimed row to completed and write its fetch results.
    ///
    /// The full header map is serialized into the header document column;
    /// the projected columns derive from it.
    pub fn save_page_result(&self, id: i64, page: &PageData) -> Result<()> {
        let headers_json = serde_json::to_string(&page.headers)?;

        let conn = self.conn();
        let updated = conn.execute(
            r#"
            UPDATE pages
            SET status = 'completed',
                processing_started_at = NULL,
                status_code = ?1,
                title = ?2,
                meta_desc = ?3,
                meta_robots = ?4,
                canonical_url = ?5,
                content_hash = ?6,
                ttfb_ms = ?7,
                download_time_ms = ?8,
                response_size = ?9,
                headers_json = ?10,
                crawled_at = ?11
            WHERE id = ?12
            "#,
            params![
                page.status_code,
                page.title,
                page.meta_desc,
                page.meta_robots,
                page.canonical_url,
                page.content_hash,
                page.ttfb_ms,
                page.download_time_ms,
                page.response_size,
                headers_json,
                now_str(),
                id
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("page id {id}")));
        }
        Ok(())
    }

    /// Transition a row to error, recording the failure and bumping the
    /// retry counter.
    pub fn save_page_error(&self, id: i64, kind: ErrorKind, message: &str) -> Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            r#"
            UPDATE pages
            SET status = 'error',
                processing_started_at = NULL,
                last_error_type = ?1,
                last_error_message = ?2,
                retry_count = retry_count + 1
            WHERE id = ?3
            "#,
            params![kind.as_str(), message, id],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("page id {id}")));
        }
        Ok(())
    }

    /// Advisory status lookup for the admission filter.
    ///
    /// Returns None when the URL is unknown, and swallows store errors the
    /// same way: a failed check only means the URL may be re-admitted, and
    /// the unique constraint makes that harmless.
    pub fn url_status(&self, url: &str) -> Option<PageStatus> {
        let conn = self.conn();
        conn.query_row(
            "SELECT status FROM pages WHERE url = ?1",
            params![url],
            |row| row.get::<_, String>(0),
        )
        .ok()
        .and_then(|s| PageStatus::parse(&s))
    }

    /// Fetch a full page row by URL.
    pub fn page_by_url(&self, url: &str) -> Result<Option<PageRecord>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE url = ?1"),
            params![url],
            row_to_page_record,
        );
        to_option(result)
    }

    /// List pages in one status, most recently added first.
    pub fn pages_by_status(&self, status: PageStatus, limit: u32) -> Result<Vec<PageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE status = ?1 \
             ORDER BY added_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![status.as_str(), limit], row_to_page_record)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

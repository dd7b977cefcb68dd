//! Append-only crawl error log.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{now_str, parse_datetime, CrawlStore, Result};
use crate::models::ErrorKind;

/// One row from the crawl error log.
#[derive(Debug, Clone)]
pub struct ErrorLogEntry {
    pub url: String,
    pub error_type: String,
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl CrawlStore {
    /// Append a row to the error log.
    ///
    /// Distinct from per-page error state: a retried page can accumulate
    /// several log rows while ending in any terminal status.
    pub fn log_error(&self, url: &str, kind: ErrorKind, message: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO crawl_errors (url, error_type, error_message, occurred_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![url, kind.as_str(), message, now_str()],
        )?;
        Ok(())
    }

    /// Most recent error log rows, newest first.
    pub fn recent_errors(&self, limit: u32) -> Result<Vec<ErrorLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT url, error_type, error_message, occurred_at
            FROM crawl_errors
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let occurred: String = row.get(3)?;
            Ok(ErrorLogEntry {
                url: row.get(0)?,
                error_type: row.get(1)?,
                error_message: row.get(2)?,
                occurred_at: parse_datetime(&occurred).unwrap_or(DateTime::UNIX_EPOCH),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Total number of rows in the error log.
    pub fn error_log_count(&self) -> Result<u64> {
        let conn = self.conn();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM crawl_errors", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

//! Queue operations: admission, atomic claims, counts, and the janitor.

use std::time::Duration;

use chrono::Utc;
use rusqlite::params;

use super::{now_str, to_option, CrawlStore, Result};
use crate::models::QueueCounts;

/// Identity of a claimed queue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: i64,
    pub url: String,
}

impl CrawlStore {
    /// Admit URLs to the queue, skipping any already known in any state.
    ///
    /// The whole batch commits atomically. Returns the number of rows
    /// actually inserted; already-known URLs are not an error.
    pub fn add_to_queue(&self, urls: &[String]) -> Result<usize> {
        if urls.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = now_str();
        let mut added = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO pages (url, status, added_at) VALUES (?1, 'queued', ?2)",
            )?;
            for url in urls {
                added += stmt.execute(params![url, now])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Atomically claim the oldest queued row, flipping it to processing.
    ///
    /// Select-target and update happen in one statement, so two concurrent
    /// callers can never claim the same row: the loser's subquery no longer
    /// finds the candidate and it observes None.
    pub fn next_queued(&self) -> Result<Option<QueueItem>> {
        let conn = self.conn();
        let result = conn.query_row(
            r#"
            UPDATE pages
            SET status = 'processing', processing_started_at = ?1
            WHERE id = (
                SELECT id FROM pages
                WHERE status = 'queued'
                ORDER BY added_at ASC, id ASC
                LIMIT 1
            )
            RETURNING id, url
            "#,
            params![now_str()],
            |row| {
                Ok(QueueItem {
                    id: row.get(0)?,
                    url: row.get(1)?,
                })
            },
        );
        to_option(result)
    }

    /// True iff at least one row is still queued or claimed.
    ///
    /// Used at startup to decide whether a seedless invocation has work
    /// to resume.
    pub fn has_queued_items(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE status IN ('queued', 'processing')",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Aggregate row counts per status.
    pub fn queue_counts(&self) -> Result<QueueCounts> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT status, COUNT(*) FROM pages GROUP BY status")?;
        let mut counts = QueueCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match status.as_str() {
                "queued" => counts.queued = count,
                "processing" => counts.processing = count,
                "completed" => counts.completed = count,
                "error" => counts.error = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Janitor: revert rows stuck in processing longer than `timeout` back
    /// to queued, clearing their claim timestamp.
    ///
    /// Guarantees liveness across crashes: a worker that died mid-item
    /// leaves a processing row behind, and the next startup reclaims it.
    pub fn cleanup_stale_processing(&self, timeout: Duration) -> Result<usize> {
        let cutoff = (Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero()))
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, false);

        let conn = self.conn();
        let reverted = conn.execute(
            r#"
            UPDATE pages
            SET status = 'queued', processing_started_at = NULL
            WHERE status = 'processing' AND processing_started_at < ?1
            "#,
            params![cutoff],
        )?;
        Ok(reverted)
    }
}

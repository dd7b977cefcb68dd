//! SQLite-backed persistence for the crawl queue, results, and link graph.
//!
//! There is no separate queue table: the `status` column on `pages` is the
//! queue. A URL admitted once is processed at most once, and resuming an
//! interrupted crawl is just reopening the database and starting workers.

mod errors;
mod helpers;
mod links;
mod meta;
mod pages;
mod queue;

pub use errors::ErrorLogEntry;
pub use queue::QueueItem;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("page not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Current time as fixed-width RFC 3339 text.
///
/// Fixed fractional precision keeps lexicographic order equal to
/// chronological order for the timestamp comparisons in SQL.
pub(crate) fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a datetime string from the database.
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Convert a rusqlite Result<T> to Result<Option<T>>, treating
/// QueryReturnedNoRows as None.
pub(crate) fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Deserialize a stored header document back into a map.
pub(crate) fn parse_headers(json: Option<String>) -> HashMap<String, String> {
    json.and_then(|j| serde_json::from_str(&j).ok())
        .unwrap_or_default()
}

/// Open a connection with the pragmas the queue depends on.
fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    // WAL mode for concurrent readers alongside the single writer.
    // WAL persists, so this is effectively a one-time setting per database.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;

    Ok(conn)
}

/// SQLite-backed store for pages, links, errors, and coordinator metadata.
///
/// A single writer connection is shared by all workers; the mutex around
/// it serializes access so cross-connection lock contention never occurs.
pub struct CrawlStore {
    conn: Mutex<Connection>,
}

impl CrawlStore {
    /// Open (or create) the store at the given path and ensure the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = connect(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-call;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            -- One row per discovered URL; the status column is the queue.
            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'queued',

                -- Queue bookkeeping
                added_at TEXT NOT NULL,
                processing_started_at TEXT,

                -- Fetch results
                status_code INTEGER,
                title TEXT,
                meta_desc TEXT,
                meta_robots TEXT,
                canonical_url TEXT,
                content_hash TEXT,
                ttfb_ms INTEGER,
                download_time_ms INTEGER,
                response_size INTEGER,

                -- Full response header map as a JSON document, with
                -- frequently queried headers projected as generated columns.
                headers_json TEXT,
                content_type TEXT GENERATED ALWAYS AS
                    (json_extract(headers_json, '$."content-type"')) VIRTUAL,
                content_length INTEGER GENERATED ALWAYS AS
                    (json_extract(headers_json, '$."content-length"')) VIRTUAL,
                last_modified TEXT GENERATED ALWAYS AS
                    (json_extract(headers_json, '$."last-modified"')) VIRTUAL,
                server TEXT GENERATED ALWAYS AS
                    (json_extract(headers_json, '$."server"')) VIRTUAL,
                content_encoding TEXT GENERATED ALWAYS AS
                    (json_extract(headers_json, '$."content-encoding"')) VIRTUAL,
                x_cache TEXT GENERATED ALWAYS AS
                    (json_extract(headers_json, '$."x-cache"')) VIRTUAL,

                crawled_at TEXT,

                -- Error tracking
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error_type TEXT,
                last_error_message TEXT
            );

            -- Directed link graph; first observation of an edge wins.
            CREATE TABLE IF NOT EXISTS link_relations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_page_id INTEGER NOT NULL REFERENCES pages(id),
                target_page_id INTEGER NOT NULL REFERENCES pages(id),
                anchor_text TEXT,
                link_type TEXT,
                rel TEXT,
                discovered_at TEXT NOT NULL,
                UNIQUE(source_page_id, target_page_id)
            );

            -- Append-only error log, distinct from per-page error state.
            CREATE TABLE IF NOT EXISTS crawl_errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                error_type TEXT NOT NULL,
                error_message TEXT,
                occurred_at TEXT NOT NULL
            );

            -- Coordinator scratch data.
            CREATE TABLE IF NOT EXISTS crawl_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Indexes for queue operations and result queries
            CREATE INDEX IF NOT EXISTS idx_pages_status
                ON pages(status);
            CREATE INDEX IF NOT EXISTS idx_pages_status_added
                ON pages(status, added_at);
            CREATE INDEX IF NOT EXISTS idx_pages_content_hash
                ON pages(content_hash) WHERE content_hash IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_pages_content_type
                ON pages(content_type) WHERE content_type IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_pages_content_length
                ON pages(content_length) WHERE content_length IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_pages_last_modified
                ON pages(last_modified) WHERE last_modified IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_pages_server
                ON pages(server) WHERE server IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_pages_content_encoding
                ON pages(content_encoding) WHERE content_encoding IS NOT NULL;

            CREATE VIEW IF NOT EXISTS completed_pages AS
                SELECT * FROM pages WHERE status = 'completed';

            CREATE VIEW IF NOT EXISTS links AS
                SELECT
                    l.id,
                    src.url AS source_url,
                    dst.url AS target_url,
                    l.anchor_text,
                    l.link_type,
                    l.rel,
                    l.discovered_at
                FROM link_relations l
                JOIN pages src ON src.id = l.source_page_id
                JOIN pages dst ON dst.id = l.target_page_id;
        "#,
        )?;
        Ok(())
    }

    /// Release the underlying connection.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        conn.close().map_err(|(_, e)| StoreError::Database(e))
    }
}

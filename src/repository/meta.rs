//! Coordinator metadata key-value store.

use rusqlite::params;

use super::{to_option, CrawlStore, Result};

impl CrawlStore {
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let result = conn.query_row(
            "SELECT value FROM crawl_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        to_option(result)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO crawl_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

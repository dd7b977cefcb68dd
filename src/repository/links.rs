//! Link graph persistence.

use rusqlite::params;

use super::{now_str, CrawlStore, Result};
use crate::models::LinkData;

impl CrawlStore {
    /// Persist a batch of edges, resolving both endpoints to page keys.
    ///
    /// Endpoints not yet known are created as queued rows inside the same
    /// transaction, so either every edge and every created endpoint commits
    /// or none does. Edges insert idempotently: the (source, target)
    /// uniqueness constraint discards repeat observations, so the first
    /// anchor text wins.
    pub fn save_links(&self, links: &[LinkData]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = now_str();
        {
            let mut insert_page = tx.prepare_cached(
                "INSERT OR IGNORE INTO pages (url, status, added_at) VALUES (?1, 'queued', ?2)",
            )?;
            let mut page_id =
                tx.prepare_cached("SELECT id FROM pages WHERE url = ?1")?;
            let mut insert_edge = tx.prepare_cached(
                r#"
                INSERT OR IGNORE INTO link_relations
                    (source_page_id, target_page_id, anchor_text, link_type, rel, discovered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;

            for link in links {
                insert_page.execute(params![link.source_url, now])?;
                insert_page.execute(params![link.target_url, now])?;

                let source_id: i64 =
                    page_id.query_row(params![link.source_url], |row| row.get(0))?;
                let target_id: i64 =
                    page_id.query_row(params![link.target_url], |row| row.get(0))?;

                insert_edge.execute(params![
                    source_id,
                    target_id,
                    link.anchor_text,
                    link.link_type.as_str(),
                    link.rel,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Count edges in the link graph.
    pub fn link_count(&self) -> Result<u64> {
        let conn = self.conn();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM link_relations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Edges denormalized back to URL pairs, via the links view.
    pub fn links_by_source(&self, source_url: &str) -> Result<Vec<LinkData>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT source_url, target_url, anchor_text, link_type, rel
            FROM links WHERE source_url = ?1
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![source_url], |row| {
            let link_type: Option<String> = row.get(3)?;
            Ok(LinkData {
                source_url: row.get(0)?,
                target_url: row.get(1)?,
                anchor_text: row.get(2)?,
                link_type: link_type
                    .as_deref()
                    .and_then(crate::models::LinkType::parse)
                    .unwrap_or(crate::models::LinkType::Internal),
                rel: row.get(4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

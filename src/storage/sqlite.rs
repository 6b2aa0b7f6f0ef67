//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::extract::ProductRecord;
use crate::state::{CachedRobots, DomainState, PageKind, PageState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{PageRecord, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const PAGE_COLUMNS: &str = "id, url, domain, kind, state, status_code, content_type, visited_at,
     discovered_at, discovered_run, error_message, retry_count";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status";

/// Separator used when a breadcrumb trail is stored as one column
const SECTION_SEPARATOR: &str = " / ";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        kind: PageKind::from_db_string(&row.get::<_, String>(3)?).unwrap_or(PageKind::Listing),
        state: PageState::from_db_string(&row.get::<_, String>(4)?).unwrap_or(PageState::Failed),
        status_code: row.get(5)?,
        content_type: row.get(6)?,
        visited_at: row.get(7)?,
        discovered_at: row.get(8)?,
        discovered_run: row.get(9)?,
        error_message: row.get(10)?,
        retry_count: row.get(11)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Page Management =====

    fn insert_page_if_new(
        &mut self,
        url: &str,
        domain: &str,
        kind: PageKind,
        discovered_run: i64,
    ) -> StorageResult<Option<i64>> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO pages (url, domain, kind, state, discovered_at, discovered_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                url,
                domain,
                kind.to_db_string(),
                PageState::Discovered.to_db_string(),
                now,
                discovered_run
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }

        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
                params![page_id],
                page_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::PageNotFound(format!("Page ID {}", page_id)))
    }

    fn get_page_by_url(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE url = ?1", PAGE_COLUMNS),
                params![url],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn update_page_state(
        &mut self,
        page_id: i64,
        state: PageState,
        status_code: Option<u16>,
        content_type: Option<&str>,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        // Only terminal states count as a visit
        let visited_at = state.is_terminal().then(|| Utc::now().to_rfc3339());
        self.conn.execute(
            "UPDATE pages SET state = ?1, status_code = ?2, content_type = ?3,
             visited_at = COALESCE(?4, visited_at), error_message = ?5 WHERE id = ?6",
            params![
                state.to_db_string(),
                status_code,
                content_type,
                visited_at,
                error_message,
                page_id
            ],
        )?;
        Ok(())
    }

    fn increment_retry_count(&mut self, page_id: i64) -> StorageResult<u32> {
        self.conn.execute(
            "UPDATE pages SET retry_count = retry_count + 1 WHERE id = ?1",
            params![page_id],
        )?;
        let count = self.conn.query_row(
            "SELECT retry_count FROM pages WHERE id = ?1",
            params![page_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn get_pages_by_state(&self, state: PageState) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages WHERE state = ?1 ORDER BY id",
            PAGE_COLUMNS
        ))?;

        let pages = stmt
            .query_map(params![state.to_db_string()], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn reset_interrupted_pages(&mut self) -> StorageResult<Vec<PageRecord>> {
        let pages = self.get_pages_by_state(PageState::Fetching)?;
        self.conn.execute(
            "UPDATE pages SET state = ?1 WHERE state = ?2",
            params![
                PageState::Queued.to_db_string(),
                PageState::Fetching.to_db_string()
            ],
        )?;
        Ok(pages)
    }

    fn reset_crawl_state(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "
            DELETE FROM frontier;
            DELETE FROM pages;
            DELETE FROM domain_states;
        ",
        )?;
        tx.commit()?;
        Ok(())
    }

    // ===== Frontier Management =====

    fn add_to_frontier(&mut self, page_id: i64, priority: i32) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO frontier (page_id, priority) VALUES (?1, ?2)",
            params![page_id, priority],
        )?;
        Ok(())
    }

    fn remove_from_frontier(&mut self, page_id: i64) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM frontier WHERE page_id = ?1", params![page_id])?;
        Ok(())
    }

    fn load_frontier(&self) -> StorageResult<Vec<(i64, i32)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT page_id, priority FROM frontier ORDER BY priority ASC, page_id ASC")?;

        let frontier = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(frontier)
    }

    fn clear_frontier(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM frontier", [])?;
        Ok(())
    }

    // ===== Domain State Persistence =====

    fn load_domain_states(&self) -> StorageResult<HashMap<String, DomainState>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, request_count, robots_txt, robots_fetched_at FROM domain_states",
        )?;

        let rows = stmt.query_map([], |row| {
            let domain: String = row.get(0)?;
            let request_count: u32 = row.get(1)?;
            let robots_txt: Option<String> = row.get(2)?;
            let robots_fetched_at: Option<String> = row.get(3)?;

            let robots = robots_txt.zip(robots_fetched_at).and_then(|(content, fetched)| {
                fetched
                    .parse::<DateTime<Utc>>()
                    .ok()
                    .map(|fetched_at| CachedRobots {
                        content,
                        fetched_at,
                    })
            });

            // Instants are not persisted; delay and cooldown restart on load
            let state = DomainState {
                request_count,
                robots_txt: robots,
                ..DomainState::new()
            };

            Ok((domain, state))
        })?;

        let mut states = HashMap::new();
        for row in rows {
            let (domain, state) = row?;
            states.insert(domain, state);
        }

        Ok(states)
    }

    fn save_domain_states(&mut self, states: &HashMap<String, DomainState>) -> StorageResult<()> {
        for (domain, state) in states {
            self.update_domain_state(domain, state)?;
        }
        Ok(())
    }

    fn update_domain_state(&mut self, domain: &str, state: &DomainState) -> StorageResult<()> {
        let robots_txt = state.robots_txt.as_ref().map(|r| r.content.as_str());
        let robots_fetched_at = state.robots_txt.as_ref().map(|r| r.fetched_at.to_rfc3339());

        self.conn.execute(
            "INSERT OR REPLACE INTO domain_states
             (domain, request_count, robots_txt, robots_fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![domain, state.request_count, robots_txt, robots_fetched_at],
        )?;

        Ok(())
    }

    // ===== Products =====

    fn upsert_product(&mut self, record: &ProductRecord, run_id: i64) -> StorageResult<()> {
        let record_json = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO products
             (url, run_id, rpc, title, brand, section, current_price, original_price,
              in_stock, discount_label, record_json, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(url) DO UPDATE SET
                run_id = excluded.run_id,
                rpc = excluded.rpc,
                title = excluded.title,
                brand = excluded.brand,
                section = excluded.section,
                current_price = excluded.current_price,
                original_price = excluded.original_price,
                in_stock = excluded.in_stock,
                discount_label = excluded.discount_label,
                record_json = excluded.record_json,
                scraped_at = excluded.scraped_at",
            params![
                record.url,
                run_id,
                record.rpc,
                record.title,
                record.brand,
                record.section.join(SECTION_SEPARATOR),
                record.price.current,
                record.price.original,
                record.stock.in_stock,
                record.price.discount_label,
                record_json,
                record.timestamp,
            ],
        )?;
        Ok(())
    }

    fn get_product(&self, url: &str) -> StorageResult<Option<ProductRecord>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT record_json FROM products WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StorageError::from)
    }

    fn load_products(&self) -> StorageResult<Vec<ProductRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT record_json FROM products ORDER BY id")?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StorageError::from))
            .collect()
    }

    fn count_products(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_products_in_stock(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM products WHERE in_stock = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_discounted_products(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM products WHERE discount_label IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn get_section_breakdown(&self, limit: usize) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT section, COUNT(*) AS count FROM products
             WHERE section != ''
             GROUP BY section
             ORDER BY count DESC, section ASC
             LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sections = stmt
            .query_map(params![limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sections)
    }

    // ===== Statistics =====

    fn count_pages_by_state(&self, state: PageState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_pages_by_kind(&self, kind: PageKind) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE kind = ?1",
            params![kind.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_error_summary(&self) -> StorageResult<HashMap<PageState, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM pages GROUP BY state")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut summary = HashMap::new();
        for row in rows {
            let (state_str, count) = row?;
            if let Some(state) = PageState::from_db_string(&state_str) {
                if state.is_error() {
                    summary.insert(state, count as u64);
                }
            }
        }

        Ok(summary)
    }
}

//! Database schema definitions

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Every URL the crawler has seen, keyed by its normalized form
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    kind TEXT NOT NULL,
    state TEXT NOT NULL,
    status_code INTEGER,
    content_type TEXT,
    visited_at TEXT,
    discovered_at TEXT NOT NULL,
    discovered_run INTEGER NOT NULL REFERENCES runs(id),
    error_message TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pages_state ON pages(state);
CREATE INDEX IF NOT EXISTS idx_pages_kind ON pages(kind);

-- Crawl frontier queue
CREATE TABLE IF NOT EXISTS frontier (
    page_id INTEGER PRIMARY KEY REFERENCES pages(id),
    priority INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_frontier_priority ON frontier(priority);

-- Persist domain states for resumption
CREATE TABLE IF NOT EXISTS domain_states (
    domain TEXT PRIMARY KEY,
    request_count INTEGER NOT NULL DEFAULT 0,
    robots_txt TEXT,
    robots_fetched_at TEXT
);

-- Harvested product records, one row per product URL
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    rpc TEXT NOT NULL,
    title TEXT NOT NULL,
    brand TEXT NOT NULL,
    section TEXT NOT NULL,
    current_price REAL,
    original_price REAL,
    in_stock INTEGER NOT NULL,
    discount_label TEXT,
    record_json TEXT NOT NULL,
    scraped_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_rpc ON products(rpc);
CREATE INDEX IF NOT EXISTS idx_products_section ON products(section);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}

//! SQLite catalog output
//!
//! Records every run's documents, pages and failures in a SQLite database
//! for ad-hoc querying. Each report replaces the rows of its crawl (keyed by
//! the crawl start time), so re-running a resumed crawl does not duplicate
//! entries.

use crate::output::traits::{OutputHandler, OutputResult};
use crate::output::CrawlReport;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQL schema for the catalog
pub const CATALOG_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL UNIQUE,
    finished_at TEXT NOT NULL,
    status TEXT NOT NULL,
    max_depth INTEGER NOT NULL,
    elapsed_secs REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    source_url TEXT NOT NULL,
    local_path TEXT NOT NULL,
    category TEXT NOT NULL,
    confidence REAL NOT NULL,
    kind TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    retry_count INTEGER NOT NULL,
    duplicate_of TEXT,
    found_on TEXT,
    downloaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_checksum ON documents(checksum);
CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category);

CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    status TEXT NOT NULL,
    strategy TEXT,
    links_enqueued INTEGER NOT NULL,
    documents_found INTEGER NOT NULL,
    processed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    stage TEXT NOT NULL,
    error TEXT NOT NULL,
    origin TEXT,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failures_stage ON failures(stage);
"#;

/// Writes the report into a SQLite catalog
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Opens a catalog database and ensures its schema exists
pub fn open_catalog(path: &Path) -> OutputResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;
    conn.execute_batch(CATALOG_SCHEMA_SQL)?;

    Ok(conn)
}

impl OutputHandler for SqliteCatalog {
    fn name(&self) -> &'static str {
        "sqlite catalog"
    }

    fn write_report(&self, report: &CrawlReport) -> OutputResult<()> {
        let mut conn = open_catalog(&self.path)?;
        let tx = conn.transaction()?;

        let started_at = report.started_at.to_rfc3339();
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM runs WHERE started_at = ?1",
                params![started_at],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            tx.execute("DELETE FROM runs WHERE id = ?1", params![id])?;
        }

        tx.execute(
            "INSERT INTO runs (started_at, finished_at, status, max_depth, elapsed_secs)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                started_at,
                report.finished_at.to_rfc3339(),
                report.status.to_db_string(),
                report.max_depth,
                report.elapsed_secs,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        for doc in &report.documents {
            tx.execute(
                "INSERT INTO documents (run_id, source_url, local_path, category, confidence, kind,
                                        size_bytes, checksum, retry_count, duplicate_of, found_on,
                                        downloaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    run_id,
                    doc.source_url,
                    doc.local_path.to_string_lossy().into_owned(),
                    doc.category,
                    doc.confidence as f64,
                    doc.kind.extension(),
                    doc.size_bytes as i64,
                    doc.checksum,
                    doc.retry_count,
                    doc.duplicate_of,
                    doc.found_on,
                    doc.timestamp.to_rfc3339(),
                ],
            )?;
        }

        for page in &report.pages {
            tx.execute(
                "INSERT INTO pages (run_id, url, depth, status, strategy, links_enqueued,
                                    documents_found, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id,
                    page.url,
                    page.depth,
                    page.status.to_db_string(),
                    page.strategy,
                    page.links_enqueued as i64,
                    page.documents_found.len() as i64,
                    page.at.to_rfc3339(),
                ],
            )?;
        }

        for failure in &report.failures {
            tx.execute(
                "INSERT INTO failures (run_id, url, stage, error, origin, failed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id,
                    failure.url,
                    failure.stage.to_string(),
                    failure.error,
                    failure.origin,
                    failure.at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        tracing::debug!(
            "Catalog {} updated: {} documents, {} pages, {} failures",
            self.path.display(),
            report.documents.len(),
            report.pages.len(),
            report.failures.len()
        );
        Ok(())
    }
}

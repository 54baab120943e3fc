use crate::models::{ListingRecord, ScrapeStatus, SourceStatus};
use anyhow::{Context, Result};
use chrono::Utc;
use duckdb::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    external_id  VARCHAR NOT NULL,
    source       VARCHAR NOT NULL,
    title        VARCHAR NOT NULL,
    brand        VARCHAR NOT NULL,
    model        VARCHAR NOT NULL,
    year         INTEGER NOT NULL,
    price        BIGINT  NOT NULL,
    mileage      BIGINT,
    fuel_type    VARCHAR,
    transmission VARCHAR,
    location     VARCHAR,
    country      VARCHAR NOT NULL,
    source_url   VARCHAR NOT NULL,
    listing_url  VARCHAR,
    image_url    VARCHAR,
    scraped_at   TIMESTAMP NOT NULL,
    PRIMARY KEY (external_id, source)
);

CREATE TABLE IF NOT EXISTS source_status (
    source              VARCHAR PRIMARY KEY,
    status              VARCHAR NOT NULL DEFAULT 'idle',
    last_scraped_at     TIMESTAMP,
    last_listing_count  BIGINT,
    last_error          VARCHAR,
    updated_at          TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_listings_scraped_at ON listings (scraped_at);
CREATE INDEX IF NOT EXISTS idx_listings_source     ON listings (source);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

/// Embedded store shared between the CLI task and refresh-all workers; the
/// connection is serialized behind a mutex.
pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn();
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Listings ──────────────────────────────────────────────────────────────

    /// Upsert listings keyed by (external_id, source). Idempotent: re-running
    /// the same batch overwrites fields instead of duplicating rows. A row
    /// that fails is logged and skipped; the rest of the batch continues.
    pub fn upsert_listings(&self, records: &[ListingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = r#"
            INSERT INTO listings
                (external_id, source, title, brand, model, year, price, mileage,
                 fuel_type, transmission, location, country, source_url,
                 listing_url, image_url, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (external_id, source) DO UPDATE SET
                title        = excluded.title,
                brand        = excluded.brand,
                model        = excluded.model,
                year         = excluded.year,
                price        = excluded.price,
                mileage      = excluded.mileage,
                fuel_type    = excluded.fuel_type,
                transmission = excluded.transmission,
                location     = excluded.location,
                country      = excluded.country,
                source_url   = excluded.source_url,
                listing_url  = excluded.listing_url,
                image_url    = excluded.image_url,
                scraped_at   = excluded.scraped_at
        "#;

        let conn = self.conn();
        let mut written = 0usize;
        for rec in records {
            let result = conn.execute(sql, params![
                rec.external_id, rec.source, rec.title, rec.brand, rec.model,
                rec.year, rec.price, rec.mileage,
                rec.fuel_type, rec.transmission, rec.location, rec.country,
                rec.source_url, rec.listing_url, rec.image_url, rec.scraped_at,
            ]);
            match result {
                Ok(_) => written += 1,
                Err(e) => {
                    warn!("Skipping listing {} ({}): {}", rec.external_id, rec.source, e);
                }
            }
        }

        Ok(written)
    }

    /// Read back the freshest listings, newest scrape first, optionally
    /// filtered to one source.
    pub fn read_fresh(&self, source: Option<&str>, limit: usize) -> Result<Vec<ListingRecord>> {
        let base = r#"
            SELECT external_id, source, title, brand, model, year, price, mileage,
                   fuel_type, transmission, location, country, source_url,
                   listing_url, image_url, scraped_at
            FROM listings
        "#;

        let conn = self.conn();
        let rows = match source {
            Some(src) => {
                let sql = format!("{} WHERE source = ? ORDER BY scraped_at DESC LIMIT ?", base);
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map(params![src, limit as i64], row_to_listing)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("{} ORDER BY scraped_at DESC LIMIT ?", base);
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map(params![limit as i64], row_to_listing)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(rows)
    }

    pub fn listing_count(&self) -> Result<i64> {
        let conn = self.conn();
        let mut s = conn.prepare("SELECT COUNT(*) FROM listings")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn count_by_source(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM listings GROUP BY source ORDER BY source",
        )?;
        let counts = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // ── Source status ─────────────────────────────────────────────────────────

    pub fn get_status(&self, source: &str) -> Result<Option<SourceStatus>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"SELECT source, status, last_scraped_at, last_listing_count, last_error, updated_at
               FROM source_status WHERE source = ?"#,
        )?;
        let mut rows = stmt
            .query_map(params![source], row_to_status)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.pop())
    }

    pub fn list_statuses(&self) -> Result<Vec<SourceStatus>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"SELECT source, status, last_scraped_at, last_listing_count, last_error, updated_at
               FROM source_status ORDER BY source"#,
        )?;
        let rows = stmt
            .query_map([], row_to_status)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_scraping(&self, source: &str) -> Result<()> {
        self.conn().execute(
            r#"INSERT INTO source_status (source, status, updated_at)
               VALUES (?, 'scraping', ?)
               ON CONFLICT (source) DO UPDATE SET
                   status = 'scraping',
                   updated_at = excluded.updated_at"#,
            params![source, Utc::now().naive_utc()],
        )?;
        Ok(())
    }

    pub fn mark_completed(&self, source: &str, count: usize) -> Result<()> {
        let now = Utc::now().naive_utc();
        self.conn().execute(
            r#"INSERT INTO source_status
                   (source, status, last_scraped_at, last_listing_count, last_error, updated_at)
               VALUES (?, 'completed', ?, ?, NULL, ?)
               ON CONFLICT (source) DO UPDATE SET
                   status             = 'completed',
                   last_scraped_at    = excluded.last_scraped_at,
                   last_listing_count = excluded.last_listing_count,
                   last_error         = NULL,
                   updated_at         = excluded.updated_at"#,
            params![source, now, count as i64, now],
        )?;
        Ok(())
    }

    /// Record a failed scrape. `last_scraped_at` is left untouched so the
    /// source stays eligible for the next refresh attempt.
    pub fn mark_error(&self, source: &str, message: &str) -> Result<()> {
        self.conn().execute(
            r#"INSERT INTO source_status (source, status, last_error, updated_at)
               VALUES (?, 'error', ?, ?)
               ON CONFLICT (source) DO UPDATE SET
                   status     = 'error',
                   last_error = excluded.last_error,
                   updated_at = excluded.updated_at"#,
            params![source, message, Utc::now().naive_utc()],
        )?;
        Ok(())
    }
}

// ── Row mappers ───────────────────────────────────────────────────────────────

fn row_to_listing(r: &Row) -> duckdb::Result<ListingRecord> {
    Ok(ListingRecord {
        external_id: r.get(0)?,
        source: r.get(1)?,
        title: r.get(2)?,
        brand: r.get(3)?,
        model: r.get(4)?,
        year: r.get(5)?,
        price: r.get(6)?,
        mileage: r.get(7)?,
        fuel_type: r.get(8)?,
        transmission: r.get(9)?,
        location: r.get(10)?,
        country: r.get(11)?,
        source_url: r.get(12)?,
        listing_url: r.get(13)?,
        image_url: r.get(14)?,
        scraped_at: r.get(15)?,
    })
}

fn row_to_status(r: &Row) -> duckdb::Result<SourceStatus> {
    let status: String = r.get(1)?;
    Ok(SourceStatus {
        source: r.get(0)?,
        status: ScrapeStatus::parse(&status),
        last_scraped_at: r.get(2)?,
        last_listing_count: r.get(3)?,
        last_error: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

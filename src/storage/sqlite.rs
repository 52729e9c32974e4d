//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::CrawlState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ArtistFilter, ArtistRecord, ArtistStats, RunRecord, UpsertSummary};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const ARTIST_COLUMNS: &str = "id, name, post_count, other_names, group_name, url_string,
     is_active, is_banned, is_deleted, created_at, updated_at";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, start_page, max_pages,
     last_page, pages_processed, records_saved, status, message";

/// Number of artists reported by `aggregate`
const TOP_ARTISTS: usize = 10;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and ensures the schema exists
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<ArtistRecord> {
    let other_names: String = row.get(3)?;
    Ok(ArtistRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        post_count: row.get(2)?,
        other_names: serde_json::from_str(&other_names).unwrap_or_default(),
        group_name: row.get(4)?,
        url_string: row.get(5)?,
        is_active: row.get(6)?,
        is_banned: row.get(7)?,
        is_deleted: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        start_page: row.get::<_, i64>(4)? as u64,
        max_pages: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
        last_page: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
        pages_processed: row.get::<_, i64>(7)? as u64,
        records_saved: row.get::<_, i64>(8)? as u64,
        status: CrawlState::from_db_string(&row.get::<_, String>(9)?)
            .unwrap_or(CrawlState::Failed),
        message: row.get(10)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Artists =====

    fn upsert_artists(&mut self, artists: &[ArtistRecord]) -> StorageResult<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        if artists.is_empty() {
            return Ok(summary);
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO artists
                 (id, name, post_count, other_names, group_name, url_string,
                  is_active, is_banned, is_deleted, created_at, updated_at, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;

            for artist in artists {
                let other_names = serde_json::to_string(&artist.other_names)?;
                let result = stmt.execute(params![
                    artist.id,
                    artist.name,
                    artist.post_count,
                    other_names,
                    artist.group_name,
                    artist.url_string,
                    artist.is_active,
                    artist.is_banned,
                    artist.is_deleted,
                    artist.created_at,
                    artist.updated_at,
                    now,
                ]);

                match result {
                    Ok(_) => summary.written += 1,
                    Err(e) => {
                        tracing::error!(
                            "Database error saving artist {} ({}): {}",
                            artist.name,
                            artist.id,
                            e
                        );
                        summary.skipped += 1;
                    }
                }
            }
        }
        tx.commit()?;

        Ok(summary)
    }

    fn get_artist(&self, id: i64) -> StorageResult<ArtistRecord> {
        let sql = format!("SELECT {} FROM artists WHERE id = ?1", ARTIST_COLUMNS);
        self.conn
            .query_row(&sql, params![id], artist_from_row)
            .optional()?
            .ok_or(StorageError::ArtistNotFound(id))
    }

    fn query_artists(
        &self,
        filter: &ArtistFilter,
        limit: usize,
    ) -> StorageResult<Vec<ArtistRecord>> {
        let mut sql = format!("SELECT {} FROM artists WHERE 1=1", ARTIST_COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(prefix) = filter.name_starts_with.as_deref() {
            sql.push_str(" AND name LIKE ?");
            values.push(Value::Text(format!("{}%", prefix)));
        }

        if let Some(needle) = filter.name_contains.as_deref() {
            sql.push_str(" AND (name LIKE ? OR other_names LIKE ?)");
            values.push(Value::Text(format!("%{}%", needle)));
            values.push(Value::Text(format!("%{}%", needle)));
        }

        if let Some(min) = filter.min_post_count {
            sql.push_str(" AND post_count >= ?");
            values.push(Value::Integer(min));
        }

        if let Some(max) = filter.max_post_count {
            sql.push_str(" AND post_count <= ?");
            values.push(Value::Integer(max));
        }

        sql.push_str(" ORDER BY post_count DESC, id ASC LIMIT ?");
        values.push(Value::Integer(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let artists = stmt
            .query_map(params_from_iter(values.iter()), artist_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(artists)
    }

    fn count_artists(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM artists", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn aggregate(&self) -> StorageResult<ArtistStats> {
        let (total, avg, max, min): (i64, Option<f64>, Option<i64>, Option<i64>) =
            self.conn.query_row(
                "SELECT COUNT(*), AVG(post_count), MAX(post_count), MIN(post_count) FROM artists",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let mut stmt = self.conn.prepare(
            "SELECT name, post_count FROM artists ORDER BY post_count DESC, id ASC LIMIT ?1",
        )?;
        let top_artists = stmt
            .query_map(params![TOP_ARTISTS as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ArtistStats {
            total_artists: total as u64,
            avg_posts: avg,
            max_posts: max,
            min_posts: min,
            top_artists,
        })
    }

    // ===== Run Management =====

    fn create_run(
        &mut self,
        config_hash: &str,
        start_page: u64,
        max_pages: Option<u64>,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (started_at, config_hash, start_page, max_pages, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now,
                config_hash,
                start_page as i64,
                max_pages.map(|v| v as i64),
                CrawlState::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        );
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    fn record_page_progress(&mut self, run_id: i64, page: u64, records: u64) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_runs
             SET last_page = ?1,
                 pages_processed = pages_processed + 1,
                 records_saved = records_saved + ?2
             WHERE id = ?3",
            params![page as i64, records as i64, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: CrawlState, message: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, message = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, message, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }
}

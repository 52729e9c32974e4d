//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::CrawlState;
use crate::storage::{ArtistFilter, ArtistRecord, ArtistStats, RunRecord, UpsertSummary};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artist not found: {0}")]
    ArtistNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Artists are keyed by their numeric id with insert-or-replace semantics;
/// nothing in the harvester ever deletes an artist.
pub trait Storage {
    // ===== Artists =====

    /// Writes one page of artists as a single transaction
    ///
    /// A row that fails to write is logged and counted as skipped; the rest
    /// of the page still commits. Re-upserting an id overwrites every field.
    fn upsert_artists(&mut self, artists: &[ArtistRecord]) -> StorageResult<UpsertSummary>;

    /// Gets an artist by id
    fn get_artist(&self, id: i64) -> StorageResult<ArtistRecord>;

    /// Returns up to `limit` artists matching `filter`, highest post count first
    fn query_artists(&self, filter: &ArtistFilter, limit: usize)
        -> StorageResult<Vec<ArtistRecord>>;

    /// Counts stored artists
    fn count_artists(&self) -> StorageResult<u64>;

    /// Computes totals, post count statistics and the top artists
    fn aggregate(&self) -> StorageResult<ArtistStats>;

    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    fn create_run(
        &mut self,
        config_hash: &str,
        start_page: u64,
        max_pages: Option<u64>,
    ) -> StorageResult<i64>;

    /// Gets a run by id
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Records that `page` finished with `records` new writes
    fn record_page_progress(&mut self, run_id: i64, page: u64, records: u64)
        -> StorageResult<()>;

    /// Marks a run as finished with its terminal state and message
    fn finish_run(&mut self, run_id: i64, status: CrawlState, message: &str)
        -> StorageResult<()>;
}

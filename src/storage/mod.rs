//! Storage module for persisting harvested artists
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Idempotent artist upserts, one transaction per page
//! - Filtered queries and aggregate statistics
//! - Crawl run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::CrawlState;
use crate::HarvestError;
use serde::Serialize;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// One artist snapshot as returned by the listing API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistRecord {
    pub id: i64,
    pub name: String,
    pub post_count: i64,
    pub other_names: Vec<String>,
    pub group_name: String,
    pub url_string: String,
    pub is_active: bool,
    pub is_banned: bool,
    pub is_deleted: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Criteria for `Storage::query_artists`; unset fields do not filter
#[derive(Debug, Clone, Default)]
pub struct ArtistFilter {
    pub name_starts_with: Option<String>,
    /// Matches the name or any alias
    pub name_contains: Option<String>,
    pub min_post_count: Option<i64>,
    pub max_post_count: Option<i64>,
}

/// Outcome of writing one page of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Aggregate statistics over the artist table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistStats {
    pub total_artists: u64,
    pub avg_posts: Option<f64>,
    pub max_posts: Option<i64>,
    pub min_posts: Option<i64>,
    /// Name and post count, highest first
    pub top_artists: Vec<(String, i64)>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub start_page: u64,
    pub max_pages: Option<u64>,
    /// Last page whose records were committed
    pub last_page: Option<u64>,
    pub pages_processed: u64,
    pub records_saved: u64,
    pub status: CrawlState,
    pub message: Option<String>,
}

impl RunRecord {
    /// Whether a later invocation may pick up where this run left off
    ///
    /// A run still marked `running` was interrupted by a process exit.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self.status,
            CrawlState::Running | CrawlState::Stopped | CrawlState::Failed
        ) && self.remaining_pages() != Some(0)
    }

    /// First page a resumed crawl should fetch
    pub fn resume_page(&self) -> u64 {
        self.last_page.map(|p| p + 1).unwrap_or(self.start_page)
    }

    /// Pages left in the original budget, `None` if unbounded
    pub fn remaining_pages(&self) -> Option<u64> {
        self.max_pages.map(|max| {
            let done = self.resume_page().saturating_sub(self.start_page);
            max.saturating_sub(done)
        })
    }
}

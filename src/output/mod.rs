//! Output module for reporting harvest results
//!
//! This module handles:
//! - Building a summary of the stored artists and the latest crawl run
//! - Printing statistics, search results and rate-limit status

pub mod stats;

pub use stats::{
    format_artists, format_rate_limit_status, format_statistics, print_artists,
    print_rate_limit_status, print_statistics,
};

use crate::storage::{ArtistStats, RunRecord, Storage};
use crate::HarvestError;

/// Everything the `--stats` report shows
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub stats: ArtistStats,
    pub latest_run: Option<RunRecord>,
    /// Wall-clock length of the latest run, if it has finished
    pub duration_seconds: Option<u64>,
}

/// Generates a harvest summary from storage
pub fn generate_summary(storage: &dyn Storage) -> Result<HarvestSummary, HarvestError> {
    let stats = storage.aggregate()?;
    let latest_run = storage.get_latest_run()?;

    let duration_seconds = latest_run.as_ref().and_then(|run| {
        let started = run.started_at.parse::<chrono::DateTime<chrono::Utc>>().ok()?;
        let finished = run
            .finished_at
            .as_deref()?
            .parse::<chrono::DateTime<chrono::Utc>>()
            .ok()?;
        u64::try_from((finished - started).num_seconds()).ok()
    });

    Ok(HarvestSummary {
        stats,
        latest_run,
        duration_seconds,
    })
}

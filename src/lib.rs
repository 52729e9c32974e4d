//! Booru-Harvest: an adaptive, rate-limited artist metadata harvester
//!
//! This crate walks the paginated artist listing of a booru-style JSON API,
//! persists every artist into a local SQLite database and exposes the
//! results for querying. The interesting part is the fetch engine, which
//! paces requests, recovers from HTTP 429 throttling and drives a resumable
//! multi-page crawl to completion.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Booru-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] crawler::FetchError),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("A crawl is already in progress")]
    CrawlInProgress,

    #[error("Crawl task failed: {0}")]
    Task(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Booru-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlDriver, CrawlManager, PageFetcher};
pub use state::{CrawlState, CrawlStatus, Health, RateLimitStatus};
pub use storage::{ArtistFilter, ArtistRecord, SqliteStorage};

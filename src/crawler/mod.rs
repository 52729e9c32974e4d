//! Crawler module: the adaptive rate-limited fetch engine
//!
//! This module contains the core harvesting logic, including:
//! - Request pacing and sliced, cancellable waits
//! - Response classification and backoff computation
//! - The adaptive controller that escalates on throttling and relaxes on success
//! - Page fetching with bounded retries and lenient record parsing
//! - The page loop and the background crawl control surface

mod controller;
mod driver;
mod fetcher;
mod manager;
mod pacer;
mod parser;
mod progress;
mod throttle;

pub use controller::{AdaptiveController, Escalation, RateState, Recovery, ThrottleResponse};
pub use driver::{CrawlDriver, CrawlReport, STOPPED_MESSAGE};
pub use fetcher::{build_http_client, FetchError, FetchEvent, FetchObserver, PageFetch, PageFetcher};
pub use manager::CrawlManager;
pub use pacer::{sleep_sliced, Pacer};
pub use parser::{parse_artist, parse_artists, ArtistParseError};
pub use progress::StatusHandle;
pub use throttle::{
    classify, parse_retry_after, server_error_backoff, throttle_backoff, throttle_wait,
    transport_backoff, Classification,
};

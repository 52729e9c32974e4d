//! State module for tracking crawl progress
//!
//! This module provides the observable state shared between the crawl task
//! and whoever is watching it.
//!
//! # Components
//!
//! - `CrawlState`: Lifecycle of a crawl (idle, running, completed, stopped, failed)
//! - `CrawlStatus`: Progress snapshot published after every page
//! - `Health` / `RateLimitStatus`: Derived view of the adaptive rate state

mod crawl_state;
mod rate_status;

// Re-export main types
pub use crawl_state::{CrawlState, CrawlStatus};
pub use rate_status::{
    Health, RateLimitStatus, CRITICAL_THROTTLES, RECOVERED_SUCCESSES, WARNING_THROTTLES,
};

//! Shared crawl status
//!
//! The crawl task owns the only writer; any number of readers may take a
//! snapshot or subscribe for changes without blocking the task.

use crate::crawler::fetcher::{FetchEvent, FetchObserver};
use crate::state::{CrawlState, CrawlStatus};
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable handle to the latest `CrawlStatus`
#[derive(Debug, Clone)]
pub struct StatusHandle {
    sender: Arc<watch::Sender<CrawlStatus>>,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(CrawlStatus::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CrawlStatus> {
        self.sender.subscribe()
    }

    /// Copy of the current status
    pub fn snapshot(&self) -> CrawlStatus {
        self.sender.borrow().clone()
    }

    /// Replaces the whole status, e.g. at crawl start
    pub fn reset(&self, status: CrawlStatus) {
        self.sender.send_replace(status);
    }

    pub fn update<F>(&self, modify: F)
    where
        F: FnOnce(&mut CrawlStatus),
    {
        self.sender.send_modify(modify);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|status| status.message = message);
    }

    pub fn finish(&self, state: CrawlState, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|status| status.finish(state, message));
    }
}

impl FetchObserver for StatusHandle {
    fn report(&self, event: FetchEvent<'_>) {
        match event {
            FetchEvent::Attempt {
                page,
                attempt,
                max_attempts,
            } => {
                let message = if attempt == 0 {
                    format!("Fetching page {}", page)
                } else {
                    format!(
                        "Fetching page {} (attempt {}/{})",
                        page,
                        attempt + 1,
                        max_attempts
                    )
                };
                self.set_message(message);
            }
            FetchEvent::CoolingDown { remaining } => {
                self.set_message(format!(
                    "Cooling down after repeated rate limits, {:.0}s remaining",
                    remaining.as_secs_f64()
                ));
            }
            FetchEvent::Throttled { wait, .. } => {
                self.set_message(format!(
                    "Rate limited, waiting {:.1}s",
                    wait.as_secs_f64()
                ));
            }
            FetchEvent::TransientError { reason, wait, .. } => {
                self.set_message(format!(
                    "{}, retrying in {:.0}s",
                    reason,
                    wait.as_secs_f64()
                ));
            }
            FetchEvent::Waiting { .. } => {}
        }
    }
}

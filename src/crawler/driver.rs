//! Crawl driver - the page loop
//!
//! Walks page indexes from a start offset, hands each page's records to a
//! save callback and decides when the crawl ends. Termination is checked at
//! the top of every iteration, first match wins:
//!
//! 1. The cancellation token fired → `Stopped`
//! 2. The page budget is used up → `Completed`
//! 3. Too many consecutive empty pages → `Completed`
//! 4. The fetcher gave up on a page → `Failed` (returned as an error)

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{PageFetch, PageFetcher};
use crate::crawler::pacer::sleep_sliced;
use crate::crawler::progress::StatusHandle;
use crate::state::CrawlState;
use crate::storage::ArtistRecord;
use crate::HarvestError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Message recorded when a crawl is cancelled
pub const STOPPED_MESSAGE: &str = "crawl stopped by user";

/// Summary of a crawl that ended without failing
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub state: CrawlState,
    pub pages_processed: u64,
    pub records_saved: u64,
    /// First page index that was not processed
    pub next_page: u64,
    pub message: String,
}

/// Runs one crawl over a page fetcher
pub struct CrawlDriver<'a> {
    fetcher: &'a mut PageFetcher,
    config: &'a CrawlerConfig,
    wait_slice: Duration,
    status: &'a StatusHandle,
}

impl<'a> CrawlDriver<'a> {
    pub fn new(
        fetcher: &'a mut PageFetcher,
        config: &'a CrawlerConfig,
        wait_slice: Duration,
        status: &'a StatusHandle,
    ) -> Self {
        Self {
            fetcher,
            config,
            wait_slice,
            status,
        }
    }

    /// Crawls from `start_page` until a termination condition is met
    ///
    /// `save` receives the page index and its records (possibly none) and
    /// returns how many were written. Empty pages are passed too so the
    /// callback can persist progress.
    pub async fn run<S>(
        &mut self,
        start_page: u64,
        max_pages: Option<u64>,
        mut save: S,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, HarvestError>
    where
        S: FnMut(u64, &[ArtistRecord]) -> Result<usize, HarvestError>,
    {
        let mut page_index = start_page;
        let mut pages_processed = 0u64;
        let mut records_saved = 0u64;
        let mut consecutive_empty = 0u32;

        tracing::info!(
            "Starting crawl at page {} ({})",
            self.fetcher.page_token(start_page),
            match max_pages {
                Some(n) => format!("{} pages", n),
                None => "until exhausted".to_string(),
            }
        );

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Crawl stopped at page {}", page_index);
                return Ok(self.finish(
                    CrawlState::Stopped,
                    STOPPED_MESSAGE.to_string(),
                    pages_processed,
                    records_saved,
                    page_index,
                ));
            }

            if max_pages.is_some_and(|max| pages_processed >= max) {
                let message = format!(
                    "Crawl completed: {} pages, {} records saved",
                    pages_processed, records_saved
                );
                return Ok(self.finish(
                    CrawlState::Completed,
                    message,
                    pages_processed,
                    records_saved,
                    page_index,
                ));
            }

            if consecutive_empty >= self.config.max_consecutive_empty {
                let message = format!(
                    "Crawl completed: no records on {} consecutive pages, {} records saved",
                    consecutive_empty, records_saved
                );
                return Ok(self.finish(
                    CrawlState::Completed,
                    message,
                    pages_processed,
                    records_saved,
                    page_index,
                ));
            }

            let token = self.fetcher.page_token(page_index);
            self.status.update(|status| {
                status.current_page = page_index;
                status.message = format!("Fetching page {}", token);
            });

            let fetched = self
                .fetcher
                .fetch_page(&token, self.config.max_attempts, cancel, self.status)
                .await;

            let records = match fetched {
                Ok(PageFetch::Records(records)) => records,
                Ok(PageFetch::Empty) => Vec::new(),
                Ok(PageFetch::Cancelled) => continue,
                Err(e) => return Err(self.fail(e.into())),
            };

            let saved = match save(page_index, &records) {
                Ok(saved) => saved,
                Err(e) => return Err(self.fail(e)),
            };

            let message = if records.is_empty() {
                consecutive_empty += 1;
                tracing::warn!(
                    "No records on page {} ({} consecutive empty)",
                    token,
                    consecutive_empty
                );
                format!(
                    "no records on page {}, {} consecutive empty",
                    token, consecutive_empty
                )
            } else {
                consecutive_empty = 0;
                tracing::info!(
                    "Page {}: saved {} of {} artists",
                    token,
                    saved,
                    records.len()
                );
                format!("Page {}: saved {} artists", token, saved)
            };

            pages_processed += 1;
            records_saved += saved as u64;
            page_index += 1;
            self.status.update(|status| {
                status.page_finished(saved);
                status.message = message;
            });

            if pages_processed % self.config.progress_every.max(1) == 0 {
                self.log_progress(pages_processed, records_saved);
            }

            let health = self.fetcher.last_page_health();
            if health.is_degraded() {
                tracing::warn!(
                    "Rate limit health is {}, pausing {:.1}s",
                    health,
                    self.config.health_pause().as_secs_f64()
                );
                // Cancellation is picked up at the top of the loop
                sleep_sliced(self.config.health_pause(), self.wait_slice, cancel, |_| {}).await;
            }
        }
    }

    fn log_progress(&self, pages_processed: u64, records_saved: u64) {
        let rate = self.fetcher.status_snapshot();
        tracing::info!(
            "Progress: {} pages, {} records | health {} | {:.2} req/sec | {} throttles",
            pages_processed,
            records_saved,
            rate.health,
            rate.current_rate,
            rate.total_throttles
        );
    }

    fn finish(
        &self,
        state: CrawlState,
        message: String,
        pages_processed: u64,
        records_saved: u64,
        next_page: u64,
    ) -> CrawlReport {
        let rate = self.fetcher.status_snapshot();
        tracing::info!("{}", message);
        tracing::info!(
            "Final stats: {} requests, {} throttles, {:.2} req/sec, health {}",
            rate.total_requests,
            rate.total_throttles,
            rate.current_rate,
            rate.health
        );

        self.status.finish(state, message.clone());
        CrawlReport {
            state,
            pages_processed,
            records_saved,
            next_page,
            message,
        }
    }

    fn fail(&self, error: HarvestError) -> HarvestError {
        let message = format!("crawl failed: {}", error);
        tracing::error!("{}", message);
        self.status.finish(CrawlState::Failed, message);
        error
    }
}

//! Crawl control surface
//!
//! `CrawlManager` starts crawls on a background task, stops them through a
//! cancellation token and answers status queries from watch channels, so
//! none of its methods wait on the crawl itself (except `wait`).

use crate::config::Config;
use crate::crawler::controller::RateState;
use crate::crawler::driver::{CrawlDriver, CrawlReport};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::progress::StatusHandle;
use crate::state::{CrawlState, CrawlStatus, RateLimitStatus};
use crate::storage::{ArtistRecord, SqliteStorage, Storage, UpsertSummary};
use crate::{HarvestError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct ActiveCrawl {
    run_id: i64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<CrawlReport>>>,
}

/// Clears the running flag when the crawl task ends, however it ends
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts, stops and observes crawls against one store
///
/// At most one crawl runs at a time. The page fetcher, and with it the
/// adaptive rate state, is shared by every crawl this manager starts.
pub struct CrawlManager {
    config: Arc<Config>,
    config_hash: String,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<tokio::sync::Mutex<PageFetcher>>,
    rate_state: watch::Receiver<RateState>,
    status: StatusHandle,
    running: Arc<AtomicBool>,
    active: Mutex<Option<ActiveCrawl>>,
}

impl CrawlManager {
    pub fn new(config: Config, config_hash: String, storage: SqliteStorage) -> Result<Self> {
        let fetcher = PageFetcher::new(&config)?;
        let rate_state = fetcher.rate_state();

        Ok(Self {
            config: Arc::new(config),
            config_hash,
            storage: Arc::new(Mutex::new(storage)),
            fetcher: Arc::new(tokio::sync::Mutex::new(fetcher)),
            rate_state,
            status: StatusHandle::new(),
            running: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        })
    }

    /// Shared handle to the underlying store
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    /// Starts a crawl on a background task and returns its run id
    ///
    /// Fails with `CrawlInProgress` while another crawl is still running.
    pub fn start(&self, start_page: u64, max_pages: Option<u64>) -> Result<i64> {
        // Locked until the new crawl is registered; `stop` takes the same lock
        let mut active = self.lock_active()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(HarvestError::CrawlInProgress);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let run_id = lock_storage(&self.storage)?.create_run(
            &self.config_hash,
            start_page,
            max_pages,
        )?;
        tracing::info!("Created crawl run {}", run_id);

        self.status.reset(CrawlStatus::starting(start_page, max_pages));

        let cancel = CancellationToken::new();
        let task = CrawlTask {
            run_id,
            config: Arc::clone(&self.config),
            storage: Arc::clone(&self.storage),
            fetcher: Arc::clone(&self.fetcher),
            status: self.status.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            task.run(start_page, max_pages).await
        });

        *active = Some(ActiveCrawl {
            run_id,
            cancel,
            handle: Some(handle),
        });

        Ok(run_id)
    }

    /// Requests the running crawl to stop; returns whether one was running
    pub fn stop(&self) -> bool {
        let active = match self.lock_active() {
            Ok(active) => active,
            Err(_) => return false,
        };
        if !self.is_running() {
            return false;
        }
        match active.as_ref() {
            Some(crawl) => {
                tracing::info!("Stopping crawl run {}", crawl.run_id);
                self.status.set_message("stopping crawl");
                crawl.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> CrawlStatus {
        self.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CrawlStatus> {
        self.status.subscribe()
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_state.borrow().snapshot(Instant::now())
    }

    /// Waits for the most recently started crawl to end
    ///
    /// Returns `None` if there is nothing to wait for.
    pub async fn wait(&self) -> Result<Option<CrawlReport>> {
        let handle = {
            let mut active = self.lock_active()?;
            active.as_mut().and_then(|crawl| crawl.handle.take())
        };

        match handle {
            Some(handle) => {
                let report = handle
                    .await
                    .map_err(|e| HarvestError::Task(e.to_string()))??;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, Option<ActiveCrawl>>> {
        self.active
            .lock()
            .map_err(|_| HarvestError::Storage("crawl registry lock poisoned".to_string()))
    }
}

struct CrawlTask {
    run_id: i64,
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<tokio::sync::Mutex<PageFetcher>>,
    status: StatusHandle,
    cancel: CancellationToken,
}

impl CrawlTask {
    async fn run(self, start_page: u64, max_pages: Option<u64>) -> Result<CrawlReport> {
        let run_id = self.run_id;
        let storage = Arc::clone(&self.storage);
        let save = move |page: u64, records: &[ArtistRecord]| -> Result<usize> {
            let mut storage = lock_storage(&storage)?;
            let summary = if records.is_empty() {
                UpsertSummary::default()
            } else {
                storage.upsert_artists(records)?
            };
            storage.record_page_progress(run_id, page, summary.written as u64)?;
            Ok(summary.written)
        };

        let result = {
            let mut fetcher = self.fetcher.lock().await;
            let mut driver = CrawlDriver::new(
                &mut fetcher,
                &self.config.crawler,
                self.config.rate_limit.wait_slice(),
                &self.status,
            );
            driver.run(start_page, max_pages, save, &self.cancel).await
        };

        let (state, message) = match &result {
            Ok(report) => (report.state, report.message.clone()),
            Err(e) => (CrawlState::Failed, format!("crawl failed: {}", e)),
        };
        let finished = lock_storage(&self.storage)
            .and_then(|mut storage| Ok(storage.finish_run(run_id, state, &message)?));
        if let Err(e) = finished {
            tracing::error!("Failed to record end of run {}: {}", run_id, e);
        }

        result
    }
}

fn lock_storage(storage: &Mutex<SqliteStorage>) -> Result<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|_| HarvestError::Storage("storage lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, CrawlerConfig, OutputConfig, RateLimitConfig, UserAgentConfig};

    fn manager() -> CrawlManager {
        let config = Config {
            api: ApiConfig {
                base_url: "http://127.0.0.1:9/artists.json".to_string(),
                ..ApiConfig::default()
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestHarvester".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            rate_limit: RateLimitConfig::default(),
            crawler: CrawlerConfig::default(),
            output: OutputConfig {
                database_path: ":memory:".to_string(),
            },
        };
        let storage = SqliteStorage::new_in_memory().unwrap();
        CrawlManager::new(config, "hash".to_string(), storage).unwrap()
    }

    #[test]
    fn test_idle_manager() {
        let manager = manager();
        assert!(!manager.is_running());
        assert!(!manager.stop());
        assert_eq!(manager.status().state, CrawlState::Idle);

        let rate = manager.rate_limit_status();
        assert_eq!(rate.total_requests, 0);
        assert!(!rate.cooldown_active);
    }

    #[tokio::test]
    async fn test_stop_right_after_start_targets_new_crawl() {
        let manager = manager();
        let first = manager.start(0, Some(0)).unwrap();
        let report = manager.wait().await.unwrap().unwrap();
        assert_eq!(report.state, CrawlState::Completed);
        assert!(!manager.is_running());

        let second = manager.start(0, None).unwrap();
        assert!(manager.stop());
        let report = manager.wait().await.unwrap().unwrap();
        assert_eq!(report.state, CrawlState::Stopped);
        assert!(!manager.is_running());
        assert!(!manager.stop());

        let storage = manager.storage();
        let storage = storage.lock().unwrap();
        assert_eq!(storage.get_run(first).unwrap().status, CrawlState::Completed);
        assert_eq!(storage.get_run(second).unwrap().status, CrawlState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_without_crawl() {
        let manager = manager();
        assert!(manager.wait().await.unwrap().is_none());
    }
}

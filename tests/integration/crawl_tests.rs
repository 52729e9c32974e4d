//! End-to-end crawl tests: the page loop, persistence and the control surface

use crate::{artist_json, create_test_config, LISTING_PATH};
use booru_harvest::crawler::{CrawlDriver, CrawlManager, PageFetcher, StatusHandle, STOPPED_MESSAGE};
use booru_harvest::storage::{ArtistFilter, SqliteStorage, Storage};
use booru_harvest::{CrawlState, HarvestError};
use serde_json::json;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, page: &str, body: serde_json::Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

fn manager_for(server: &MockServer, temp_dir: &TempDir) -> CrawlManager {
    let db_path = temp_dir.path().join("harvest.db");
    let config = create_test_config(&server.uri(), db_path.to_str().expect("utf-8 path"));
    let storage = SqliteStorage::new(&db_path).expect("Failed to open storage");
    CrawlManager::new(config, "test-hash".to_string(), storage).expect("Failed to build manager")
}

#[tokio::test]
async fn test_three_empty_pages_complete_the_crawl() {
    let mock_server = MockServer::start().await;
    for page in ["a0", "a1", "a2"] {
        mount_page(&mock_server, page, json!([]), 1).await;
    }
    mount_page(&mock_server, "a3", json!([artist_json(3, "never", 1)]), 0).await;

    let config = create_test_config(&mock_server.uri(), ":memory:");
    let mut fetcher = PageFetcher::new(&config).expect("Failed to build fetcher");
    let status = StatusHandle::new();
    let mut saved_pages = Vec::new();

    let report = {
        let mut driver = CrawlDriver::new(
            &mut fetcher,
            &config.crawler,
            config.rate_limit.wait_slice(),
            &status,
        );
        driver
            .run(
                0,
                None,
                |page, records| {
                    saved_pages.push((page, records.len()));
                    Ok(records.len())
                },
                &CancellationToken::new(),
            )
            .await
            .expect("Crawl failed")
    };

    assert_eq!(report.state, CrawlState::Completed);
    assert_eq!(report.pages_processed, 3);
    assert_eq!(report.next_page, 3);
    assert_eq!(saved_pages, vec![(0, 0), (1, 0), (2, 0)]);

    let final_status = status.snapshot();
    assert_eq!(final_status.state, CrawlState::Completed);
    assert!(!final_status.is_running);
    assert!(final_status.progress.is_none());
}

#[tokio::test]
async fn test_records_reset_the_empty_page_counter() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "a0", json!([artist_json(1, "one", 5)]), 1).await;
    mount_page(&mock_server, "a1", json!([]), 1).await;
    mount_page(&mock_server, "a2", json!([]), 1).await;
    mount_page(&mock_server, "a3", json!([artist_json(2, "two", 5)]), 1).await;
    for page in ["a4", "a5", "a6"] {
        mount_page(&mock_server, page, json!([]), 1).await;
    }
    mount_page(&mock_server, "a7", json!([]), 0).await;

    let config = create_test_config(&mock_server.uri(), ":memory:");
    let mut fetcher = PageFetcher::new(&config).expect("Failed to build fetcher");
    let status = StatusHandle::new();
    let mut driver = CrawlDriver::new(
        &mut fetcher,
        &config.crawler,
        config.rate_limit.wait_slice(),
        &status,
    );

    let report = driver
        .run(0, None, |_, records| Ok(records.len()), &CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.state, CrawlState::Completed);
    assert_eq!(report.pages_processed, 7);
    assert_eq!(report.records_saved, 2);
}

#[tokio::test]
async fn test_throttled_page_triggers_health_pause() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "a0"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "a0", json!([artist_json(1, "slow", 2)]), 1).await;
    mount_page(&mock_server, "a1", json!([artist_json(2, "fast", 2)]), 1).await;

    let mut config = create_test_config(&mock_server.uri(), ":memory:");
    config.crawler.health_pause_ms = 1500;
    let mut fetcher = PageFetcher::new(&config).expect("Failed to build fetcher");
    let status = StatusHandle::new();
    let mut driver = CrawlDriver::new(
        &mut fetcher,
        &config.crawler,
        config.rate_limit.wait_slice(),
        &status,
    );

    let started = Instant::now();
    let report = driver
        .run(0, Some(2), |_, records| Ok(records.len()), &CancellationToken::new())
        .await
        .expect("Crawl failed");
    let elapsed = started.elapsed();

    assert_eq!(report.state, CrawlState::Completed);
    assert_eq!(report.records_saved, 2);
    // One-second cooldown plus a single pause after the throttled page
    assert!(elapsed >= Duration::from_millis(2500), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3900), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_page_budget_from_offset() {
    let mock_server = MockServer::start().await;
    for index in 10..15 {
        let page = format!("a{}", index);
        let body = json!([artist_json(index, &format!("artist_{}", index), index * 2)]);
        mount_page(&mock_server, &page, body, 1).await;
    }
    mount_page(&mock_server, "a15", json!([artist_json(15, "beyond", 1)]), 0).await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = manager_for(&mock_server, &temp_dir);

    let run_id = manager.start(10, Some(5)).expect("Failed to start crawl");
    let report = manager
        .wait()
        .await
        .expect("Crawl failed")
        .expect("No crawl to wait for");

    assert_eq!(report.state, CrawlState::Completed);
    assert_eq!(report.pages_processed, 5);
    assert_eq!(report.records_saved, 5);
    assert_eq!(report.next_page, 15);

    let status = manager.status();
    assert_eq!(status.state, CrawlState::Completed);
    assert_eq!(status.progress, Some(100.0));
    assert_eq!(status.current_page, 14);

    let storage = manager.storage();
    let storage = storage.lock().expect("storage lock");
    assert_eq!(storage.count_artists().unwrap(), 5);

    let run = storage.get_run(run_id).unwrap();
    assert_eq!(run.status, CrawlState::Completed);
    assert_eq!(run.start_page, 10);
    assert_eq!(run.max_pages, Some(5));
    assert_eq!(run.last_page, Some(14));
    assert_eq!(run.pages_processed, 5);
    assert_eq!(run.records_saved, 5);
    assert!(run.finished_at.is_some());
    assert!(!run.is_resumable());
}

#[tokio::test]
async fn test_missing_post_count_is_stored_as_zero() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        "a0",
        json!([
            {"id": 77, "name": "quiet_artist"},
            artist_json(78, "busy_artist", 900)
        ]),
        1,
    )
    .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = manager_for(&mock_server, &temp_dir);
    manager.start(0, Some(1)).expect("Failed to start crawl");
    manager.wait().await.expect("Crawl failed");

    let storage = manager.storage();
    let storage = storage.lock().expect("storage lock");
    let quiet = storage.get_artist(77).unwrap();
    assert_eq!(quiet.post_count, 0);
    assert!(quiet.other_names.is_empty());
    assert!(quiet.is_active);

    let busy = storage
        .query_artists(
            &ArtistFilter {
                min_post_count: Some(100),
                ..ArtistFilter::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].name, "busy_artist");
}

#[tokio::test]
async fn test_fatal_error_fails_the_crawl() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "a0", json!([artist_json(1, "kept", 1)]), 1).await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "a1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "a2", json!([]), 0).await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = manager_for(&mock_server, &temp_dir);
    let run_id = manager.start(0, None).expect("Failed to start crawl");

    let result = manager.wait().await;
    assert!(matches!(result, Err(HarvestError::Fetch(_))));

    let status = manager.status();
    assert_eq!(status.state, CrawlState::Failed);
    assert!(status.message.starts_with("crawl failed:"));
    assert!(status.message.contains("a1"));
    assert!(status.message.contains("401"));

    let storage = manager.storage();
    let storage = storage.lock().expect("storage lock");
    let run = storage.get_run(run_id).unwrap();
    assert_eq!(run.status, CrawlState::Failed);
    assert_eq!(run.last_page, Some(0));
    assert!(run.is_resumable());
    assert_eq!(run.resume_page(), 1);
    assert_eq!(storage.count_artists().unwrap(), 1);
}

#[tokio::test]
async fn test_stop_during_backoff_is_prompt() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = manager_for(&mock_server, &temp_dir);
    let run_id = manager.start(0, None).expect("Failed to start crawl");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(manager.status().message.starts_with("Rate limited"));

    let stop_requested = Instant::now();
    assert!(manager.stop());
    let report = manager
        .wait()
        .await
        .expect("Crawl failed")
        .expect("No crawl to wait for");

    // One wait slice is 100ms in the test configuration
    assert!(stop_requested.elapsed() < Duration::from_secs(1));
    assert_eq!(report.state, CrawlState::Stopped);
    assert_eq!(report.pages_processed, 0);
    assert_eq!(manager.status().message, STOPPED_MESSAGE);
    assert!(!manager.is_running());

    let rate = manager.rate_limit_status();
    assert_eq!(rate.total_throttles, 1);

    let storage = manager.storage();
    let storage = storage.lock().expect("storage lock");
    let run = storage.get_run(run_id).unwrap();
    assert_eq!(run.status, CrawlState::Stopped);
    assert!(run.is_resumable());
    assert_eq!(run.resume_page(), 0);
}

#[tokio::test]
async fn test_concurrent_start_is_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = manager_for(&mock_server, &temp_dir);

    manager.start(0, None).expect("Failed to start crawl");
    assert!(manager.is_running());
    assert!(matches!(
        manager.start(0, None),
        Err(HarvestError::CrawlInProgress)
    ));

    manager.stop();
    let report = manager
        .wait()
        .await
        .expect("Crawl failed")
        .expect("No crawl to wait for");
    assert_eq!(report.state, CrawlState::Stopped);

    // Only the first start created a run
    let storage = manager.storage();
    let storage = storage.lock().expect("storage lock");
    assert_eq!(storage.get_latest_run().unwrap().unwrap().id, 1);
}

#[tokio::test]
async fn test_rate_state_carries_over_between_crawls() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "a0", json!([artist_json(1, "first", 1)]), 2).await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = manager_for(&mock_server, &temp_dir);

    manager.start(0, Some(1)).expect("Failed to start crawl");
    manager.wait().await.expect("Crawl failed");
    assert_eq!(manager.rate_limit_status().total_requests, 1);

    manager.start(0, Some(1)).expect("Failed to restart crawl");
    manager.wait().await.expect("Crawl failed");
    assert_eq!(manager.rate_limit_status().total_requests, 2);
    assert_eq!(manager.rate_limit_status().consecutive_successes, 2);

    // Re-harvesting the same id overwrites instead of duplicating
    let storage = manager.storage();
    let storage = storage.lock().expect("storage lock");
    assert_eq!(storage.count_artists().unwrap(), 1);
}

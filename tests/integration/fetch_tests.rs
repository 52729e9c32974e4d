//! Page fetcher behavior against a mock listing API

use crate::{artist_json, create_test_config, LISTING_PATH};
use booru_harvest::crawler::{FetchError, PageFetch, PageFetcher};
use booru_harvest::Health;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn fetcher_for(server: &MockServer) -> PageFetcher {
    let config = create_test_config(&server.uri(), ":memory:");
    PageFetcher::new(&config).expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_fetch_page_returns_records() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "a0"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            artist_json(1, "first", 10),
            artist_json(2, "second", 20)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let result = fetcher
        .fetch_page("a0", 5, &CancellationToken::new(), &())
        .await
        .expect("Fetch failed");

    match result {
        PageFetch::Records(records) => {
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].name, "first");
            assert_eq!(records[1].post_count, 20);
        }
        other => panic!("Expected records, got {:?}", other),
    }

    let status = fetcher.status_snapshot();
    assert_eq!(status.total_requests, 1);
    assert_eq!(status.consecutive_successes, 1);
    assert!(status.avg_response_ms.is_some());
}

#[tokio::test]
async fn test_empty_array_is_not_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let result = fetcher
        .fetch_page("a9", 5, &CancellationToken::new(), &())
        .await
        .expect("Fetch failed");

    assert!(matches!(result, PageFetch::Empty));
}

#[tokio::test]
async fn test_retry_after_header_is_honored() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0.4"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([artist_json(1, "a", 1)])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let start = Instant::now();
    let result = fetcher
        .fetch_page("a0", 5, &CancellationToken::new(), &())
        .await
        .expect("Fetch failed");

    assert!(start.elapsed() >= Duration::from_millis(400));
    assert!(matches!(result, PageFetch::Records(ref r) if r.len() == 1));

    let status = fetcher.status_snapshot();
    assert_eq!(status.total_requests, 2);
    assert_eq!(status.total_throttles, 1);
    assert_eq!(status.consecutive_throttles, 0);
    assert!(status.last_throttle_at.is_some());
    assert_eq!(status.health, Health::Recovering);
}

#[tokio::test]
async fn test_repeated_throttling_escalates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([artist_json(5, "e", 0)])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let base_rate = fetcher.status_snapshot().base_rate;
    let start = Instant::now();
    let result = fetcher
        .fetch_page("a0", 5, &CancellationToken::new(), &())
        .await
        .expect("Fetch failed");

    assert!(matches!(result, PageFetch::Records(_)));
    // The third throttle opened a one-second cooldown before the fourth attempt
    assert!(start.elapsed() >= Duration::from_secs(1));

    let status = fetcher.status_snapshot();
    assert_eq!(status.total_throttles, 3);
    assert!(status.is_rate_limited);
    // The closing success clears the streak; the page itself still hit warning
    assert_eq!(status.health, Health::Recovering);
    assert_eq!(fetcher.last_page_health(), Health::Warning);
    assert!(status.current_rate < base_rate);
    assert!(status.backoff_seed_secs > 1.0);
}

#[tokio::test]
async fn test_fatal_status_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("access denied"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let result = fetcher
        .fetch_page("a4", 5, &CancellationToken::new(), &())
        .await;

    match result {
        Err(FetchError::Fatal {
            page,
            status,
            message,
        }) => {
            assert_eq!(page, "a4");
            assert_eq!(status, 403);
            assert!(message.contains("access denied"));
        }
        other => panic!("Expected fatal error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_sleep_after_final_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let start = Instant::now();
    let result = fetcher
        .fetch_page("a0", 1, &CancellationToken::new(), &())
        .await;

    assert!(matches!(
        result,
        Err(FetchError::RetriesExhausted { attempts: 1, .. })
    ));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_malformed_body_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let result = fetcher
        .fetch_page("a0", 2, &CancellationToken::new(), &())
        .await;

    match result {
        Err(FetchError::RetriesExhausted {
            attempts,
            last_error,
            ..
        }) => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("not a JSON array"));
        }
        other => panic!("Expected retries exhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_items_do_not_abort_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            artist_json(1, "good", 3),
            {"name": "no id"},
            "not an object",
            artist_json(4, "also_good", 7)
        ])))
        .mount(&mock_server)
        .await;

    let mut fetcher = fetcher_for(&mock_server).await;
    let result = fetcher
        .fetch_page("a0", 5, &CancellationToken::new(), &())
        .await
        .expect("Fetch failed");

    match result {
        PageFetch::Records(records) => {
            let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
            assert_eq!(ids, vec![1, 4]);
        }
        other => panic!("Expected records, got {:?}", other),
    }
}

#[tokio::test]
async fn test_credentials_are_sent() {
    let mock_server = MockServer::start().await;

    // "alice:secret" in base64
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(wiremock::matchers::header(
            "authorization",
            "Basic YWxpY2U6c2VjcmV0",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), ":memory:");
    config.api.username = Some("alice".to_string());
    config.api.api_key = Some("secret".to_string());
    let mut fetcher = PageFetcher::new(&config).expect("Failed to build fetcher");

    let result = fetcher
        .fetch_page("a0", 1, &CancellationToken::new(), &())
        .await
        .expect("Fetch failed");
    assert!(matches!(result, PageFetch::Empty));
}

//! Integration tests for the harvester
//!
//! These tests run the fetcher, the crawl driver and the crawl manager
//! against wiremock servers standing in for the artist listing API.

mod crawl_tests;
mod fetch_tests;

use booru_harvest::config::{
    ApiConfig, Config, CrawlerConfig, OutputConfig, RateLimitConfig, UserAgentConfig,
};
use serde_json::{json, Value};

pub const LISTING_PATH: &str = "/artists.json";

/// Creates a test configuration pointing at a mock server, tuned so that
/// pacing, cooldowns and waits stay in the millisecond range
pub fn create_test_config(server_uri: &str, db_path: &str) -> Config {
    Config {
        api: ApiConfig {
            base_url: format!("{}{}", server_uri, LISTING_PATH),
            timeout_secs: 5,
            ..ApiConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        rate_limit: RateLimitConfig {
            base_interval_ms: 10,
            max_interval_ms: 100,
            cooldown_base_secs: 1,
            cooldown_step_secs: 0,
            cooldown_max_secs: 1,
            wait_slice_ms: 100,
            ..RateLimitConfig::default()
        },
        crawler: CrawlerConfig {
            health_pause_ms: 50,
            ..CrawlerConfig::default()
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
    }
}

/// One listing item with every field populated
pub fn artist_json(id: i64, name: &str, post_count: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "post_count": post_count,
        "other_names": [format!("{}_alias", name)],
        "group_name": "",
        "url_string": format!("https://example.com/{}", name),
        "is_active": true,
        "is_banned": false,
        "is_deleted": false,
        "created_at": "2020-01-01T00:00:00.000-05:00",
        "updated_at": "2021-01-01T00:00:00.000-05:00"
    })
}

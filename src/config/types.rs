use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Booru-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Remote listing API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApiConfig {
    /// Endpoint returning a JSON array of artists per page
    pub base_url: String,

    /// Records requested per page (the API caps this at 1000)
    pub page_size: u32,

    /// Prefix of the page token, followed by the zero-based page index
    pub page_prefix: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Account name for HTTP basic authentication
    pub username: Option<String>,

    /// API key paired with `username`
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://danbooru.donmai.us/artists.json".to_string(),
            page_size: 1000,
            page_prefix: "a".to_string(),
            timeout_secs: 30,
            username: None,
            api_key: None,
        }
    }
}

impl ApiConfig {
    /// Returns the basic-auth credentials when both halves are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.api_key.as_deref()) {
            (Some(user), Some(key)) if !user.is_empty() && !key.is_empty() => Some((user, key)),
            _ => None,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Pacing, throttling and backoff tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    /// Floor of the inter-request interval (milliseconds)
    pub base_interval_ms: u64,

    /// Ceiling of the inter-request interval (milliseconds)
    pub max_interval_ms: u64,

    /// Consecutive throttles before the interval is escalated
    pub escalation_threshold: u32,

    /// Consecutive successes before the interval is relaxed
    pub recovery_threshold: u32,

    /// Starting backoff seed (seconds)
    pub initial_backoff_secs: f64,

    /// Upper bound of the backoff seed (seconds)
    pub max_backoff_seed_secs: f64,

    /// Lower bound of the backoff seed (seconds)
    pub min_backoff_seed_secs: f64,

    /// Upper bound of any single throttle wait (seconds)
    pub max_wait_secs: f64,

    /// Cooldown length before the per-throttle step is added (seconds)
    pub cooldown_base_secs: u64,

    /// Cooldown added per consecutive throttle (seconds)
    pub cooldown_step_secs: u64,

    /// Upper bound of the cooldown (seconds)
    pub cooldown_max_secs: u64,

    /// Longest uninterrupted sleep; longer waits are sliced (milliseconds)
    pub wait_slice_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 150,
            max_interval_ms: 2000,
            escalation_threshold: 3,
            recovery_threshold: 10,
            initial_backoff_secs: 1.0,
            max_backoff_seed_secs: 30.0,
            min_backoff_seed_secs: 1.0,
            max_wait_secs: 300.0,
            cooldown_base_secs: 5 * 60,
            cooldown_step_secs: 60,
            cooldown_max_secs: 30 * 60,
            wait_slice_ms: 5000,
        }
    }
}

impl RateLimitConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs_f64(self.max_wait_secs)
    }

    pub fn wait_slice(&self) -> Duration {
        Duration::from_millis(self.wait_slice_ms)
    }

    /// Cooldown imposed after an escalation with `consecutive` throttles in a row
    pub fn cooldown_for(&self, consecutive: u32) -> Duration {
        let secs = self
            .cooldown_base_secs
            .saturating_add(self.cooldown_step_secs.saturating_mul(consecutive as u64))
            .min(self.cooldown_max_secs);
        Duration::from_secs(secs)
    }
}

/// Crawl loop behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Attempts per page before giving up
    pub max_attempts: u32,

    /// Consecutive empty pages treated as the end of the listing
    pub max_consecutive_empty: u32,

    /// Extra pause after each page while health is warning or critical (milliseconds)
    pub health_pause_ms: u64,

    /// Pages between rate-limit progress log lines
    pub progress_every: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_consecutive_empty: 3,
            health_pause_ms: 2000,
            progress_every: 10,
        }
    }
}

impl CrawlerConfig {
    pub fn health_pause(&self) -> Duration {
        Duration::from_millis(self.health_pause_ms)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

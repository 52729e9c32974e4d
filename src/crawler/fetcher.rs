//! Page fetcher
//!
//! Retrieves one page of the artist listing with bounded retries. Each
//! attempt waits for the pacer, issues a single GET, classifies the
//! response and either returns, fails fast, or backs off and tries again.
//!
//! | Outcome                     | Action                                     |
//! |-----------------------------|--------------------------------------------|
//! | 200 with a non-empty array  | Parse records, return them                 |
//! | 200 with an empty array     | Return `PageFetch::Empty`                  |
//! | 200 with any other body     | Retry after 1s                             |
//! | 429                         | Escalate rate state, retry after backoff   |
//! | 502 / 503 / 504             | Retry after `min(5 * 2^attempt, 60)`s      |
//! | Timeout / transport error   | Retry after `2^attempt`s                   |
//! | Anything else               | `FetchError::Fatal`, no retry              |

use crate::config::{ApiConfig, Config, UserAgentConfig};
use crate::crawler::controller::{AdaptiveController, RateState};
use crate::crawler::pacer::{sleep_sliced, Pacer};
use crate::crawler::parser::parse_artists;
use crate::crawler::throttle::{self, Classification};
use crate::state::{Health, RateLimitStatus};
use crate::storage::ArtistRecord;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Longest response body excerpt carried in a fatal error
const ERROR_BODY_LIMIT: usize = 200;

/// Crawl-ending fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page {page} failed with HTTP {status}: {message}")]
    Fatal {
        page: String,
        status: u16,
        message: String,
    },

    #[error("page {page} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        page: String,
        attempts: u32,
        last_error: String,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Progress events emitted while fetching
#[derive(Debug, Clone)]
pub enum FetchEvent<'a> {
    Attempt {
        page: &'a str,
        attempt: u32,
        max_attempts: u32,
    },
    CoolingDown {
        remaining: Duration,
    },
    Throttled {
        page: &'a str,
        attempt: u32,
        wait: Duration,
    },
    TransientError {
        page: &'a str,
        attempt: u32,
        reason: &'a str,
        wait: Duration,
    },
    Waiting {
        remaining: Duration,
    },
}

/// Receives fetch events (e.g. to keep a status message current)
pub trait FetchObserver: Send + Sync {
    fn report(&self, event: FetchEvent<'_>) {
        let _ = event;
    }
}

impl FetchObserver for () {}

/// Result of one logical page retrieval
#[derive(Debug)]
pub enum PageFetch {
    Records(Vec<ArtistRecord>),
    /// The API returned an empty array: possibly the end of the listing
    Empty,
    /// The cancellation token fired before the page was retrieved
    Cancelled,
}

enum AttemptOutcome {
    Items(Vec<Value>),
    Retry {
        wait: Duration,
        reason: String,
        throttled: bool,
    },
    Fatal { status: u16, message: String },
}

/// Builds the HTTP client used for every page request
pub fn build_http_client(
    api: &ApiConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, FetchError> {
    let client = Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(api.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

/// Fetches listing pages through the pacer and the adaptive controller
#[derive(Debug)]
pub struct PageFetcher {
    client: Client,
    endpoint: Url,
    page_size: u32,
    page_prefix: String,
    credentials: Option<(String, String)>,
    wait_slice: Duration,
    pacer: Pacer,
    controller: AdaptiveController,
    /// Longest throttle streak seen while fetching the latest page
    page_throttle_peak: u32,
}

impl PageFetcher {
    pub fn new(config: &Config) -> crate::Result<Self> {
        let client = build_http_client(&config.api, &config.user_agent)?;
        let endpoint = Url::parse(&config.api.base_url)?;
        let wait_slice = config.rate_limit.wait_slice();

        Ok(Self {
            client,
            endpoint,
            page_size: config.api.page_size,
            page_prefix: config.api.page_prefix.clone(),
            credentials: config
                .api
                .credentials()
                .map(|(user, key)| (user.to_string(), key.to_string())),
            wait_slice,
            pacer: Pacer::new(wait_slice),
            controller: AdaptiveController::new(config.rate_limit.clone()),
            page_throttle_peak: 0,
        })
    }

    /// Page token for a zero-based page index, e.g. `a0`, `a1`, ...
    pub fn page_token(&self, index: u64) -> String {
        format!("{}{}", self.page_prefix, index)
    }

    pub fn controller(&self) -> &AdaptiveController {
        &self.controller
    }

    /// Receiver tracking every rate state change
    pub fn rate_state(&self) -> watch::Receiver<RateState> {
        self.controller.subscribe()
    }

    pub fn health(&self) -> Health {
        self.controller.health()
    }

    pub fn status_snapshot(&self) -> RateLimitStatus {
        self.controller.status_snapshot()
    }

    /// Health as it stood at the worst point of the latest page fetch
    ///
    /// The success that ends a page clears the throttle streak, so the
    /// current health alone never shows a page that fought through 429s.
    pub fn last_page_health(&self) -> Health {
        let state = self.controller.state();
        Health::from_counters(
            self.page_throttle_peak.max(state.consecutive_throttles()),
            state.total_throttles(),
            state.consecutive_successes(),
        )
    }

    /// Retrieves one page, retrying throttles and transient errors up to
    /// `max_attempts` attempts in total
    pub async fn fetch_page(
        &mut self,
        page: &str,
        max_attempts: u32,
        cancel: &CancellationToken,
        observer: &dyn FetchObserver,
    ) -> Result<PageFetch, FetchError> {
        let max_attempts = max_attempts.max(1);
        let mut last_error = String::new();
        self.page_throttle_peak = 0;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Ok(PageFetch::Cancelled);
            }
            if !self
                .pacer
                .wait_if_needed(self.controller.state(), cancel, observer)
                .await
            {
                return Ok(PageFetch::Cancelled);
            }

            self.controller.record_request();
            observer.report(FetchEvent::Attempt {
                page,
                attempt,
                max_attempts,
            });
            tracing::debug!(
                "Fetching page {} (attempt {}/{})",
                page,
                attempt + 1,
                max_attempts
            );

            let (wait, reason, throttled) = match self.attempt(page, attempt).await {
                AttemptOutcome::Items(items) => {
                    if let Some(recovery) = self.controller.record_success() {
                        tracing::debug!("Recovered to {:?} interval", recovery.interval);
                    }
                    if items.is_empty() {
                        return Ok(PageFetch::Empty);
                    }
                    let artists = parse_artists(&items, page);
                    tracing::debug!(
                        "Page {}: parsed {}/{} records",
                        page,
                        artists.len(),
                        items.len()
                    );
                    return Ok(PageFetch::Records(artists));
                }
                AttemptOutcome::Fatal { status, message } => {
                    tracing::error!("Fatal response for page {}: HTTP {}", page, status);
                    return Err(FetchError::Fatal {
                        page: page.to_string(),
                        status,
                        message,
                    });
                }
                AttemptOutcome::Retry {
                    wait,
                    reason,
                    throttled,
                } => (wait, reason, throttled),
            };

            if throttled {
                self.page_throttle_peak = self
                    .page_throttle_peak
                    .max(self.controller.state().consecutive_throttles());
                observer.report(FetchEvent::Throttled {
                    page,
                    attempt,
                    wait,
                });
            } else {
                observer.report(FetchEvent::TransientError {
                    page,
                    attempt,
                    reason: &reason,
                    wait,
                });
            }

            last_error = reason;
            if attempt + 1 >= max_attempts {
                break;
            }

            tracing::info!(
                "Retrying page {} in {:.1}s ({})",
                page,
                wait.as_secs_f64(),
                last_error
            );
            let slice = self.wait_slice;
            let finished = sleep_sliced(wait, slice, cancel, |remaining| {
                if remaining > slice {
                    tracing::info!(
                        "Waiting for rate limit: {:.0}s remaining",
                        remaining.as_secs_f64()
                    );
                }
                observer.report(FetchEvent::Waiting { remaining });
            })
            .await;
            if !finished {
                return Ok(PageFetch::Cancelled);
            }
        }

        tracing::error!(
            "Giving up on page {} after {} attempts: {}",
            page,
            max_attempts,
            last_error
        );
        Err(FetchError::RetriesExhausted {
            page: page.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    async fn attempt(&mut self, page: &str, attempt: u32) -> AttemptOutcome {
        let mut request = self.client.get(self.endpoint.clone()).query(&[
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
        ]);
        if let Some((user, key)) = &self.credentials {
            request = request.basic_auth(user, Some(key));
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = throttle::describe_transport(&e);
                tracing::warn!("Request for page {} failed: {}", page, reason);
                return AttemptOutcome::Retry {
                    wait: throttle::transport_backoff(attempt),
                    reason,
                    throttled: false,
                };
            }
        };
        self.controller.record_latency(started.elapsed());

        match throttle::classify(response.status(), response.headers()) {
            Classification::Success => match response.bytes().await {
                Ok(body) => match serde_json::from_slice::<Value>(&body) {
                    Ok(Value::Array(items)) => AttemptOutcome::Items(items),
                    Ok(_) => AttemptOutcome::Retry {
                        wait: throttle::MALFORMED_BODY_BACKOFF,
                        reason: "response body is not a JSON array".to_string(),
                        throttled: false,
                    },
                    Err(e) => AttemptOutcome::Retry {
                        wait: throttle::MALFORMED_BODY_BACKOFF,
                        reason: format!("invalid JSON body: {}", e),
                        throttled: false,
                    },
                },
                Err(e) => AttemptOutcome::Retry {
                    wait: throttle::transport_backoff(attempt),
                    reason: format!("failed to read body: {}", e),
                    throttled: false,
                },
            },
            Classification::Throttled { retry_after } => {
                let response = self
                    .controller
                    .record_throttle(Instant::now(), retry_after, attempt);
                AttemptOutcome::Retry {
                    wait: response.wait,
                    reason: "rate limited (429)".to_string(),
                    throttled: true,
                }
            }
            Classification::TransientServerError { reason, .. } => {
                tracing::warn!("Page {}: {}", page, reason);
                AttemptOutcome::Retry {
                    wait: throttle::server_error_backoff(attempt),
                    reason,
                    throttled: false,
                }
            }
            Classification::FatalError { status, reason } => {
                let body = response.text().await.unwrap_or_default();
                let excerpt: String = body.trim().chars().take(ERROR_BODY_LIMIT).collect();
                let message = if excerpt.is_empty() {
                    reason
                } else {
                    format!("{}: {}", reason, excerpt)
                };
                AttemptOutcome::Fatal { status, message }
            }
        }
    }
}

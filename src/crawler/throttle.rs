//! Response classification and backoff computation
//!
//! | Condition                    | Classification         | Backoff                                   |
//! |------------------------------|------------------------|-------------------------------------------|
//! | HTTP 200                     | Success                | none                                      |
//! | HTTP 429                     | Throttled              | Retry-After, else seeded exponential      |
//! | HTTP 502 / 503 / 504         | TransientServerError   | `min(5 * 2^attempt, 60)` seconds          |
//! | Timeout / transport failure  | TransientServerError   | `2^attempt` seconds                       |
//! | Any other status             | FatalError             | none, propagated immediately              |

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

/// Lower bound of the multiplicative jitter applied to throttle backoff
pub const JITTER_MIN: f64 = 0.8;

/// Upper bound of the multiplicative jitter applied to throttle backoff
pub const JITTER_MAX: f64 = 1.2;

/// Ceiling of the 5xx backoff
pub const SERVER_ERROR_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Wait before retrying a 200 response whose body could not be decoded
pub const MALFORMED_BODY_BACKOFF: Duration = Duration::from_secs(1);

/// What a single HTTP response means for the retry loop
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Success,
    Throttled {
        /// Server-suggested wait from a numeric `Retry-After` header
        retry_after: Option<Duration>,
    },
    TransientServerError {
        status: u16,
        reason: String,
    },
    FatalError {
        status: u16,
        reason: String,
    },
}

/// Classifies a response by status code and headers
pub fn classify(status: StatusCode, headers: &HeaderMap) -> Classification {
    match status {
        StatusCode::OK => Classification::Success,
        StatusCode::TOO_MANY_REQUESTS => Classification::Throttled {
            retry_after: parse_retry_after(headers),
        },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Classification::TransientServerError {
                status: status.as_u16(),
                reason: format!("server error {}", status),
            }
        }
        other => Classification::FatalError {
            status: other.as_u16(),
            reason: format!("unexpected status {}", other),
        },
    }
}

/// Human-readable cause of a request that never produced a response
pub fn describe_transport(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}

/// Reads a numeric `Retry-After` header (seconds, fractional allowed)
///
/// HTTP-date values and garbage are ignored so the caller falls back to
/// computed backoff. Values too large for a `Duration` saturate and are
/// later capped by the maximum wait.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    } else {
        tracing::warn!("Invalid Retry-After header '{}', using calculated backoff", raw);
        None
    }
}

/// Draws a jitter factor uniformly from `[JITTER_MIN, JITTER_MAX]`
pub fn jitter() -> f64 {
    rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX)
}

/// `seed * 2^attempt * (1 + 0.5 * consecutive_throttles) * jitter`, in seconds
pub fn throttle_backoff(
    backoff_seed_secs: f64,
    attempt: u32,
    consecutive_throttles: u32,
    jitter: f64,
) -> Duration {
    let exponential = backoff_seed_secs * 2f64.powi(attempt.min(30) as i32);
    let consecutive_factor = 1.0 + 0.5 * consecutive_throttles as f64;
    let secs = exponential * consecutive_factor * jitter;
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Wait after a 429: the server's hint if present, else jittered backoff,
/// never longer than `max_wait`
pub fn throttle_wait(
    retry_after: Option<Duration>,
    backoff_seed_secs: f64,
    attempt: u32,
    consecutive_throttles: u32,
    max_wait: Duration,
) -> Duration {
    let wait = retry_after.unwrap_or_else(|| {
        throttle_backoff(backoff_seed_secs, attempt, consecutive_throttles, jitter())
    });
    wait.min(max_wait)
}

/// Backoff after a 502/503/504
pub fn server_error_backoff(attempt: u32) -> Duration {
    let secs = 5u64.saturating_mul(2u64.saturating_pow(attempt.min(20)));
    Duration::from_secs(secs).min(SERVER_ERROR_BACKOFF_CAP)
}

/// Backoff after a timeout or transport failure
pub fn transport_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.min(20)))
}

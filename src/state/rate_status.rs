//! Rate-limit health and the read-only status snapshot

use serde::Serialize;
use std::fmt;

/// Consecutive throttles at which health becomes `Critical`
pub const CRITICAL_THROTTLES: u32 = 5;

/// Consecutive throttles at which health becomes `Warning`
pub const WARNING_THROTTLES: u32 = 3;

/// Consecutive successes needed to leave `Recovering`
pub const RECOVERED_SUCCESSES: u32 = 5;

/// Summary of recent throttle/success history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Recovering,
    Warning,
    Critical,
}

impl Health {
    /// Derives health from the throttle and success counters
    pub fn from_counters(
        consecutive_throttles: u32,
        total_throttles: u64,
        consecutive_successes: u32,
    ) -> Self {
        if consecutive_throttles >= CRITICAL_THROTTLES {
            Self::Critical
        } else if consecutive_throttles >= WARNING_THROTTLES {
            Self::Warning
        } else if total_throttles > 0 && consecutive_successes < RECOVERED_SUCCESSES {
            Self::Recovering
        } else {
            Self::Healthy
        }
    }

    /// True when the whole crawl should back off, not just single requests
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Recovering => "recovering",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the adaptive rate state, as exposed to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    /// Current request rate (requests per second)
    pub current_rate: f64,

    /// Configured request rate at the base interval
    pub base_rate: f64,

    /// True while the interval is above its configured floor
    pub is_rate_limited: bool,

    pub total_requests: u64,
    pub total_throttles: u64,
    pub consecutive_throttles: u32,
    pub consecutive_successes: u32,

    pub cooldown_active: bool,
    pub cooldown_remaining_seconds: f64,

    /// RFC 3339 timestamp of the last 429 response
    pub last_throttle_at: Option<String>,

    pub backoff_seed_secs: f64,
    pub max_wait_secs: f64,

    /// Exponentially weighted response latency
    pub avg_response_ms: Option<f64>,

    pub health: Health,
}

//! Adaptive rate state and its transitions
//!
//! `RateState` is owned by one `AdaptiveController` and only changes through
//! its methods. Every change is published on a watch channel so status
//! readers never touch the worker's copy.

use crate::config::RateLimitConfig;
use crate::crawler::throttle;
use crate::state::{Health, RateLimitStatus};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Weight of the newest sample in the latency average
const LATENCY_SMOOTHING: f64 = 0.1;

/// Factor applied to the interval and backoff seed on recovery
const RECOVERY_FACTOR: f64 = 0.9;

/// Factor applied to the backoff seed on escalation
const SEED_GROWTH: f64 = 1.5;

/// Mutable pacing state for one target API
#[derive(Debug, Clone)]
pub struct RateState {
    current_interval: Duration,
    base_interval: Duration,
    max_interval: Duration,
    consecutive_throttles: u32,
    total_throttles: u64,
    consecutive_successes: u32,
    total_requests: u64,
    cooldown_until: Option<Instant>,
    backoff_seed: f64,
    max_wait: Duration,
    last_throttle_at: Option<DateTime<Utc>>,
    avg_response_time: Option<Duration>,
}

impl RateState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            current_interval: config.base_interval(),
            base_interval: config.base_interval(),
            max_interval: config.max_interval(),
            consecutive_throttles: 0,
            total_throttles: 0,
            consecutive_successes: 0,
            total_requests: 0,
            cooldown_until: None,
            backoff_seed: config.initial_backoff_secs,
            max_wait: config.max_wait(),
            last_throttle_at: None,
            avg_response_time: None,
        }
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn consecutive_throttles(&self) -> u32 {
        self.consecutive_throttles
    }

    pub fn total_throttles(&self) -> u64 {
        self.total_throttles
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Backoff seed in seconds
    pub fn backoff_seed(&self) -> f64 {
        self.backoff_seed
    }

    pub fn last_throttle_at(&self) -> Option<DateTime<Utc>> {
        self.last_throttle_at
    }

    pub fn avg_response_time(&self) -> Option<Duration> {
        self.avg_response_time
    }

    pub fn health(&self) -> Health {
        Health::from_counters(
            self.consecutive_throttles,
            self.total_throttles,
            self.consecutive_successes,
        )
    }

    /// Time left in the cooldown window, zero when none is active
    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Requests per second at the current interval
    pub fn current_rate(&self) -> f64 {
        rate_of(self.current_interval)
    }

    pub fn snapshot(&self, now: Instant) -> RateLimitStatus {
        let cooldown = self.cooldown_remaining(now);
        RateLimitStatus {
            current_rate: self.current_rate(),
            base_rate: rate_of(self.base_interval),
            is_rate_limited: self.current_interval > self.base_interval,
            total_requests: self.total_requests,
            total_throttles: self.total_throttles,
            consecutive_throttles: self.consecutive_throttles,
            consecutive_successes: self.consecutive_successes,
            cooldown_active: !cooldown.is_zero(),
            cooldown_remaining_seconds: cooldown.as_secs_f64(),
            last_throttle_at: self.last_throttle_at.map(|t| t.to_rfc3339()),
            backoff_seed_secs: self.backoff_seed,
            max_wait_secs: self.max_wait.as_secs_f64(),
            avg_response_ms: self
                .avg_response_time
                .map(|avg| avg.as_secs_f64() * 1000.0),
            health: self.health(),
        }
    }
}

fn rate_of(interval: Duration) -> f64 {
    let secs = interval.as_secs_f64();
    if secs > 0.0 {
        1.0 / secs
    } else {
        f64::INFINITY
    }
}

/// Outcome of an escalation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Escalation {
    pub interval: Duration,
    pub cooldown: Duration,
    pub backoff_seed: f64,
}

/// How the controller answered one 429
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleResponse {
    /// Wait before the next attempt, from the seed in effect before escalating
    pub wait: Duration,
    pub escalation: Option<Escalation>,
}

/// Outcome of a recovery step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recovery {
    pub interval: Duration,
    pub backoff_seed: f64,
}

/// Owns the rate state and applies throttle/success transitions
#[derive(Debug)]
pub struct AdaptiveController {
    state: RateState,
    config: RateLimitConfig,
    publisher: watch::Sender<RateState>,
}

impl AdaptiveController {
    pub fn new(config: RateLimitConfig) -> Self {
        let state = RateState::new(&config);
        let (publisher, _) = watch::channel(state.clone());
        Self {
            state,
            config,
            publisher,
        }
    }

    pub fn state(&self) -> &RateState {
        &self.state
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Receiver that always holds the latest published state
    pub fn subscribe(&self) -> watch::Receiver<RateState> {
        self.publisher.subscribe()
    }

    pub fn health(&self) -> Health {
        self.state.health()
    }

    pub fn status_snapshot(&self) -> RateLimitStatus {
        self.state.snapshot(Instant::now())
    }

    /// Counts one outbound attempt
    pub fn record_request(&mut self) {
        self.state.total_requests += 1;
        self.publish();
    }

    /// Folds one response latency into the running average
    pub fn record_latency(&mut self, elapsed: Duration) {
        let average = match self.state.avg_response_time {
            Some(avg) => avg.mul_f64(1.0 - LATENCY_SMOOTHING) + elapsed.mul_f64(LATENCY_SMOOTHING),
            None => elapsed,
        };
        self.state.avg_response_time = Some(average);
        tracing::debug!(
            "Response time {:.0}ms (avg {:.0}ms)",
            elapsed.as_secs_f64() * 1000.0,
            average.as_secs_f64() * 1000.0
        );
        self.publish();
    }

    /// Updates the counters for a 429 on `attempt`, computes the retry wait
    /// and then escalates if the streak is long enough
    pub fn record_throttle(
        &mut self,
        now: Instant,
        retry_after: Option<Duration>,
        attempt: u32,
    ) -> ThrottleResponse {
        self.state.total_throttles += 1;
        self.state.consecutive_throttles += 1;
        self.state.consecutive_successes = 0;
        self.state.last_throttle_at = Some(Utc::now());

        tracing::warn!(
            "Rate limit hit (429). Consecutive: {}, Total: {}",
            self.state.consecutive_throttles,
            self.state.total_throttles
        );

        let wait = self.throttle_wait(retry_after, attempt);
        let escalation = self.on_throttled(now);
        self.publish();
        ThrottleResponse { wait, escalation }
    }

    /// Escalation step: doubles the interval, opens a cooldown window and
    /// grows the backoff seed once the throttle streak reaches the threshold
    pub fn on_throttled(&mut self, now: Instant) -> Option<Escalation> {
        let streak = self.state.consecutive_throttles;
        if streak < self.config.escalation_threshold {
            return None;
        }

        let doubled = self.state.current_interval.saturating_mul(2);
        self.state.current_interval = doubled.min(self.state.max_interval);

        let cooldown = self.config.cooldown_for(streak);
        self.state.cooldown_until = Some(now + cooldown);

        self.state.backoff_seed =
            (self.state.backoff_seed * SEED_GROWTH).min(self.config.max_backoff_seed_secs);

        tracing::warn!(
            "Escalating: interval now {:.3}s, cooldown {}s, backoff seed {:.1}s",
            self.state.current_interval.as_secs_f64(),
            cooldown.as_secs(),
            self.state.backoff_seed
        );

        Some(Escalation {
            interval: self.state.current_interval,
            cooldown,
            backoff_seed: self.state.backoff_seed,
        })
    }

    /// Updates the counters for a successful page and relaxes if earned
    pub fn record_success(&mut self) -> Option<Recovery> {
        self.state.consecutive_successes = self.state.consecutive_successes.saturating_add(1);
        self.state.consecutive_throttles = 0;

        let recovery = self.on_success_streak();
        self.publish();
        recovery
    }

    /// Recovery step: shrinks the interval and backoff seed toward their
    /// floors after enough consecutive successes
    ///
    /// Only fires while the interval is above its base. The success counter
    /// is reset only when it does.
    pub fn on_success_streak(&mut self) -> Option<Recovery> {
        if self.state.consecutive_successes < self.config.recovery_threshold {
            return None;
        }
        if self.state.current_interval <= self.state.base_interval {
            return None;
        }

        let min_seed = self.config.min_backoff_seed_secs;
        self.state.current_interval = self
            .state
            .current_interval
            .mul_f64(RECOVERY_FACTOR)
            .max(self.state.base_interval);
        self.state.backoff_seed = (self.state.backoff_seed * RECOVERY_FACTOR).max(min_seed);
        self.state.consecutive_successes = 0;

        tracing::info!(
            "Recovering: interval now {:.3}s ({:.1} req/sec), backoff seed {:.1}s",
            self.state.current_interval.as_secs_f64(),
            self.state.current_rate(),
            self.state.backoff_seed
        );

        Some(Recovery {
            interval: self.state.current_interval,
            backoff_seed: self.state.backoff_seed,
        })
    }

    /// Wait before retrying after a 429 on `attempt`
    pub fn throttle_wait(&self, retry_after: Option<Duration>, attempt: u32) -> Duration {
        throttle::throttle_wait(
            retry_after,
            self.state.backoff_seed,
            attempt,
            self.state.consecutive_throttles,
            self.state.max_wait,
        )
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }
}

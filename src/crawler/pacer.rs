//! Request pacing
//!
//! The pacer enforces the minimum spacing between request starts and holds
//! every request back while an adaptive cooldown is active. All waits are
//! sliced so a cancellation takes effect within one slice.

use crate::crawler::controller::RateState;
use crate::crawler::fetcher::{FetchEvent, FetchObserver};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Sleeps for `total`, in slices of at most `slice`, until done or cancelled
///
/// `on_slice` is called before each slice with the time still remaining.
/// Returns `false` if the token was cancelled before the full wait elapsed.
pub async fn sleep_sliced<F>(
    total: Duration,
    slice: Duration,
    cancel: &CancellationToken,
    mut on_slice: F,
) -> bool
where
    F: FnMut(Duration),
{
    let deadline = Instant::now() + total;
    let slice = slice.max(Duration::from_millis(1));

    loop {
        if cancel.is_cancelled() {
            return false;
        }

        let now = Instant::now();
        if now >= deadline {
            return true;
        }

        let remaining = deadline - now;
        on_slice(remaining);

        tokio::select! {
            () = tokio::time::sleep(remaining.min(slice)) => {}
            () = cancel.cancelled() => return false,
        }
    }
}

/// Tracks when the last request started and spaces the next one
#[derive(Debug)]
pub struct Pacer {
    last_request: Option<Instant>,
    wait_slice: Duration,
}

impl Pacer {
    pub fn new(wait_slice: Duration) -> Self {
        Self {
            last_request: None,
            wait_slice,
        }
    }

    /// Start time of the last permitted request
    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }

    /// Time that must still pass before the next request may start
    pub fn time_until_next(&self, state: &RateState, now: Instant) -> Duration {
        let cooldown = state.cooldown_remaining(now);
        let spacing = match self.last_request {
            Some(last) => state
                .current_interval()
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        cooldown.max(spacing)
    }

    /// Blocks until the cooldown has elapsed and `current_interval` has
    /// passed since the last request, then records the new request start
    ///
    /// Returns `false` if cancelled while waiting; nothing is recorded then.
    pub async fn wait_if_needed(
        &mut self,
        state: &RateState,
        cancel: &CancellationToken,
        observer: &dyn FetchObserver,
    ) -> bool {
        let cooldown = state.cooldown_remaining(Instant::now());
        if !cooldown.is_zero() {
            tracing::info!(
                "In adaptive cooldown for {:.1} more seconds",
                cooldown.as_secs_f64()
            );
            let finished = sleep_sliced(cooldown, self.wait_slice, cancel, |remaining| {
                observer.report(FetchEvent::CoolingDown { remaining });
            })
            .await;
            if !finished {
                return false;
            }
        }

        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            let interval = state.current_interval();
            if elapsed < interval {
                let sleep_time = interval - elapsed;
                tracing::debug!(
                    "Rate limiting: sleeping for {:.3}s (current rate: {:.1} req/sec)",
                    sleep_time.as_secs_f64(),
                    state.current_rate()
                );
                if !sleep_sliced(sleep_time, self.wait_slice, cancel, |_| {}).await {
                    return false;
                }
            }
        }

        self.last_request = Some(Instant::now());
        true
    }
}

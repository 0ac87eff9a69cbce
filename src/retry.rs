// SPDX-License-Identifier: MIT

//! Exponential backoff with jitter, used by provider implementations when a
//! backend signals rate limiting (§4.E).

use std::time::{Duration, Instant};

use rand::Rng;

/// Exponential backoff calculator with jitter.
///
/// Each call to [`ExponentialBackoff::next_backoff`] returns `None` once
/// `max_elapsed_time` has passed since construction, signalling callers to
/// give up and surface the failure for the next scheduled tick.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_interval: Duration,
    initial_interval: Duration,
    max_interval: Duration,
    max_elapsed_time: Option<Duration>,
    multiplier: f64,
    randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Backoff tuned for DNS provider API calls: capped at 60s per §4.E.
    pub fn provider_backoff(max_interval: Duration) -> Self {
        Self::new(
            Duration::from_millis(200),
            max_interval,
            Some(Duration::from_secs(5 * 60)),
            2.0,
            0.1,
        )
    }

    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = Instant::now();
    }

    /// Returns the next wait duration, or `None` if `max_elapsed_time` has
    /// elapsed since this backoff was created.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let wait = self.apply_jitter(self.current_interval);

        let next_millis =
            (self.current_interval.as_millis() as f64 * self.multiplier) as u64;
        self.current_interval =
            Duration::from_millis(next_millis).min(self.max_interval);

        Some(wait)
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval;
        }
        let delta = self.randomization_factor * interval.as_millis() as f64;
        let min = interval.as_millis() as f64 - delta;
        let max = interval.as_millis() as f64 + delta;
        let jittered = rand::rng().random_range(min..=max).max(0.0);
        Duration::from_millis(jittered as u64)
    }
}

/// True for HTTP status codes a provider client should retry.
pub fn is_retryable_http_status(status: reqwest::StatusCode) -> bool {
    matches!(
        status.as_u16(),
        429 | 500 | 502 | 503 | 504
    )
}

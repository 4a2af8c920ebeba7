//! Per-bucket request pacing driven by the platform's rate-limit headers.
//!
//! Every response may carry `X-Rate-Limit-*` headers describing the bucket
//! the route belongs to. The limiter learns the route → bucket association
//! from the first such response and spreads the remaining budget of a bucket
//! over its reset window once it drops under the low-water mark.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Header carrying the bucket capacity.
pub const HEADER_LIMIT: &str = "X-Rate-Limit-Limit";
/// Header carrying the remaining budget.
pub const HEADER_REMAINING: &str = "X-Rate-Limit-Remaining";
/// Header carrying the seconds until the bucket resets.
pub const HEADER_RESET: &str = "X-Rate-Limit-Reset";
/// Header carrying the bucket name.
pub const HEADER_BUCKET: &str = "X-Rate-Limit-Bucket";
/// Header present when the global limit was hit.
pub const HEADER_GLOBAL: &str = "X-Rate-Limit-Global";

/// Default remaining-budget threshold under which pacing kicks in.
pub const DEFAULT_LOW_WATER: u32 = 120;

/// Rate-limit information extracted from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitHeaders {
    /// Bucket capacity.
    pub limit: Option<u32>,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset: f64,
    /// Bucket name, if the platform named one.
    pub bucket: Option<String>,
    /// Whether the global limit was hit.
    pub global: bool,
}

impl RateLimitHeaders {
    /// Parses the headers through a case-insensitive lookup function.
    ///
    /// Returns `None` unless both `remaining` and `reset` are present and numeric.
    pub fn parse<'a>(get: impl Fn(&str) -> Option<&'a str>) -> Option<Self> {
        let remaining = get(HEADER_REMAINING)?.trim().parse().ok()?;
        let reset = get(HEADER_RESET)?.trim().parse().ok()?;
        Some(Self {
            limit: get(HEADER_LIMIT).and_then(|v| v.trim().parse().ok()),
            remaining,
            reset,
            bucket: get(HEADER_BUCKET)
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string),
            global: get(HEADER_GLOBAL).is_some(),
        })
    }
}

/// Upper bound of any computed delay; reset values past it are clamped.
pub const MAX_DELAY: Duration = Duration::from_secs(3600);

/// Budget of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Requests left in the current window.
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset: f64,
}

/// Computes the delay before the next request against `bucket`.
pub fn compute_delay(bucket: Option<Bucket>, low_water: u32) -> Duration {
    let Some(Bucket { remaining, reset }) = bucket else {
        return Duration::ZERO;
    };
    if reset <= 0.0 || !reset.is_finite() {
        return Duration::ZERO;
    }
    if remaining == 0 {
        return clamped_secs(reset);
    }
    if remaining > low_water {
        return Duration::ZERO;
    }
    clamped_secs(reset / f64::from(remaining))
}

fn clamped_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}

#[derive(Debug, Default)]
struct State {
    routes: HashMap<String, String>,
    buckets: HashMap<String, Bucket>,
}

/// Shared, lock-protected rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    low_water: u32,
    state: Mutex<State>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_WATER)
    }
}

impl RateLimiter {
    /// Creates a limiter with the given low-water mark.
    pub fn new(low_water: u32) -> Self {
        Self {
            low_water,
            state: Mutex::new(State::default()),
        }
    }

    /// Returns the delay the next request on `route` should wait.
    pub fn delay_for(&self, route: &str) -> Duration {
        let state = self.state.lock();
        let bucket_name = state.routes.get(route).map_or(route, String::as_str);
        compute_delay(state.buckets.get(bucket_name).copied(), self.low_water)
    }

    /// Sleeps for the computed delay, if any.
    pub async fn wait_for_rate(&self, route: &str) {
        let delay = self.delay_for(route);
        if !delay.is_zero() {
            debug!(route, delay_ms = delay.as_millis() as u64, "Rate limit pacing");
            tokio::time::sleep(delay).await;
        }
    }

    /// Records the headers of a response to `route`.
    pub fn update(&self, route: &str, headers: &RateLimitHeaders) {
        if headers.global {
            warn!(route, reset = headers.reset, "Global rate limit reached");
        }

        let mut state = self.state.lock();
        let bucket_name = match &headers.bucket {
            Some(bucket) => state
                .routes
                .entry(route.to_string())
                .or_insert_with(|| bucket.clone())
                .clone(),
            None => state
                .routes
                .get(route)
                .cloned()
                .unwrap_or_else(|| route.to_string()),
        };

        trace!(
            route,
            bucket = %bucket_name,
            remaining = headers.remaining,
            reset = headers.reset,
            "Rate limit updated"
        );
        state.buckets.insert(
            bucket_name,
            Bucket {
                remaining: headers.remaining,
                reset: headers.reset,
            },
        );
    }

    /// Returns the bucket `route` currently resolves to.
    pub fn bucket_of(&self, route: &str) -> String {
        self.state
            .lock()
            .routes
            .get(route)
            .cloned()
            .unwrap_or_else(|| route.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn headers(remaining: u32, reset: f64, bucket: Option<&str>) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: Some(120),
            remaining,
            reset,
            bucket: bucket.map(str::to_string),
            global: false,
        }
    }

    #[test]
    fn exhausted_bucket_waits_full_reset() {
        let limiter = RateLimiter::default();
        limiter.update("message/create", &headers(0, 10.0, None));
        assert_eq!(limiter.delay_for("message/create"), Duration::from_secs(10));
    }

    #[test]
    fn huge_reset_is_clamped_instead_of_panicking() {
        let limiter = RateLimiter::default();
        limiter.update("r", &headers(0, 1e20, None));
        assert_eq!(limiter.delay_for("r"), MAX_DELAY);

        let b = |remaining, reset| Some(Bucket { remaining, reset });
        assert_eq!(compute_delay(b(3, 1e300), 120), MAX_DELAY);
        assert_eq!(compute_delay(b(0, 7200.0), 120), MAX_DELAY);
        assert_eq!(compute_delay(b(0, f64::INFINITY), 120), Duration::ZERO);
    }

    #[test]
    fn delay_rules() {
        assert_eq!(compute_delay(None, 120), Duration::ZERO);
        let b = |remaining, reset| Some(Bucket { remaining, reset });
        assert_eq!(compute_delay(b(0, 0.0), 120), Duration::ZERO);
        assert_eq!(compute_delay(b(500, 10.0), 120), Duration::ZERO);
        assert_eq!(compute_delay(b(120, 60.0), 120), Duration::from_millis(500));
        assert_eq!(compute_delay(b(4, 2.0), 120), Duration::from_millis(500));
    }

    #[test]
    fn bucket_mapping_is_first_write_wins() {
        let limiter = RateLimiter::default();
        limiter.update("message/create", &headers(100, 5.0, Some("message/create")));
        limiter.update("message/create", &headers(90, 5.0, Some("other")));
        assert_eq!(limiter.bucket_of("message/create"), "message/create");

        limiter.update("message/update", &headers(0, 3.0, Some("message/create")));
        assert_eq!(limiter.delay_for("message/create"), Duration::from_secs(3));
    }

    #[test]
    fn parse_headers() {
        let pairs = [
            ("x-rate-limit-limit", "120"),
            ("x-rate-limit-remaining", "7"),
            ("x-rate-limit-reset", "42"),
            ("x-rate-limit-bucket", "guild/list"),
        ];
        let parsed = RateLimitHeaders::parse(|name| {
            pairs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| *v)
        })
        .unwrap();
        assert_eq!(parsed.remaining, 7);
        assert_eq!(parsed.reset, 42.0);
        assert_eq!(parsed.bucket.as_deref(), Some("guild/list"));
        assert!(!parsed.global);

        assert!(RateLimitHeaders::parse(|_| None).is_none());
    }

    #[tokio::test]
    async fn concurrent_updates_are_safe() {
        let limiter = Arc::new(RateLimiter::default());
        let mut tasks = Vec::new();
        for i in 0..16u32 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.update("user/me", &headers(200 + i, 1.0, None));
                limiter.wait_for_rate("user/me").await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(limiter.delay_for("user/me"), Duration::ZERO);
    }
}

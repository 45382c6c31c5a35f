use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Fixed-window limiter knobs.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    /// Track `session_id:user_id` pairs separately when a user id is known.
    pub per_user: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
            per_user: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Outcome of one rate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the window resets, present only on rejection.
    pub retry_after: Option<Duration>,
}

impl RateDecision {
    /// Seconds until retry, rounded up so clients never retry early.
    pub fn retry_after_seconds(&self) -> u64 {
        self.retry_after
            .map(|d| (d.as_millis() as u64).div_ceil(1000))
            .unwrap_or(0)
    }

    /// Ready-to-send HTTP 429 shape for a rejected decision.
    pub fn rejection(&self) -> RateLimitRejection {
        RateLimitRejection {
            status: 429,
            retry_after_seconds: self.retry_after_seconds(),
            limit: self.limit,
            remaining: self.remaining,
        }
    }
}

/// HTTP shape of a rate-limit rejection, framework-free so the HTTP layer
/// only has to copy fields.
#[derive(Debug, Clone)]
pub struct RateLimitRejection {
    pub status: u16,
    pub retry_after_seconds: u64,
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Debug, Serialize)]
pub struct RateLimitBody {
    pub error: &'static str,
    #[serde(rename = "retryAfterSeconds")]
    pub retry_after_seconds: u64,
}

impl RateLimitRejection {
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            ("Retry-After", self.retry_after_seconds.to_string()),
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
        ]
    }

    pub fn body(&self) -> RateLimitBody {
        RateLimitBody {
            error: "RATE_LIMITED",
            retry_after_seconds: self.retry_after_seconds,
        }
    }
}

/// Limiter statistics for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub tracked_keys: usize,
    pub allowed_total: u64,
    pub rejected_total: u64,
}

/// Fixed-window request limiter keyed by session (optionally by user within
/// a session). Checks are the only mutation; a rejection leaves every other
/// subsystem untouched.
pub struct SessionRateLimiter {
    entries: DashMap<String, WindowEntry>,
    config: RateLimitConfig,
    allowed_total: AtomicU64,
    rejected_total: AtomicU64,
}

impl SessionRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            allowed_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
        }
    }

    fn key(&self, session_id: &str, user_id: Option<&str>) -> String {
        match (self.config.per_user, user_id) {
            (true, Some(user_id)) => format!("{session_id}:{user_id}"),
            _ => session_id.to_string(),
        }
    }

    /// Count this request against its window.
    pub fn check(&self, session_id: &str, user_id: Option<&str>) -> RateDecision {
        self.check_at(session_id, user_id, Instant::now())
    }

    /// Clock-injected variant of [`check`].
    ///
    /// [`check`]: SessionRateLimiter::check
    pub fn check_at(&self, session_id: &str, user_id: Option<&str>, now: Instant) -> RateDecision {
        let key = self.key(session_id, user_id);
        let mut entry = self.entries.entry(key).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        let elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;

        let allowed = entry.count <= self.config.max_requests;
        let remaining = self.config.max_requests.saturating_sub(entry.count);
        let retry_after = if allowed {
            None
        } else {
            Some(
                self.config
                    .window
                    .saturating_sub(now.saturating_duration_since(entry.window_start)),
            )
        };
        drop(entry);

        if allowed {
            self.allowed_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected_total.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                session_id = session_id,
                "rate limit exceeded, retry in {:?}",
                retry_after
            );
        }

        RateDecision {
            allowed,
            limit: self.config.max_requests,
            remaining,
            retry_after,
        }
    }

    /// Drop windows that already ended; purely housekeeping.
    pub fn purge_expired(&self) {
        self.purge_expired_at(Instant::now());
    }

    pub fn purge_expired_at(&self, now: Instant) {
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) < self.config.window);
    }

    /// Forget all windows (test/admin support).
    pub fn reset(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            tracked_keys: self.entries.len(),
            allowed_total: self.allowed_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> SessionRateLimiter {
        SessionRateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(10),
            per_user: false,
        })
    }

    #[test]
    fn test_allows_up_to_max_then_rejects() {
        let limiter = limiter();
        let base = Instant::now();

        for used in 1..=3u32 {
            let d = limiter.check_at("s1", None, base);
            assert!(d.allowed);
            assert_eq!(d.remaining, 3 - used);
            assert_eq!(d.retry_after, None);
        }

        let rejected = limiter.check_at("s1", None, base + Duration::from_secs(2));
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.retry_after, Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = limiter();
        let base = Instant::now();
        for _ in 0..4 {
            limiter.check_at("s1", None, base);
        }

        let after_reset = limiter.check_at("s1", None, base + Duration::from_secs(10));
        assert!(after_reset.allowed);
        assert_eq!(after_reset.remaining, 2);
    }

    #[test]
    fn test_sessions_tracked_independently() {
        let limiter = limiter();
        let base = Instant::now();
        for _ in 0..4 {
            limiter.check_at("s1", None, base);
        }

        let other = limiter.check_at("s2", None, base);
        assert!(other.allowed);
        assert_eq!(other.remaining, 2);
    }

    #[test]
    fn test_per_user_keys_within_one_session() {
        let limiter = SessionRateLimiter::new(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(10),
            per_user: true,
        });
        let base = Instant::now();
        for _ in 0..3 {
            limiter.check_at("s1", Some("alice"), base);
        }

        assert!(!limiter.check_at("s1", Some("alice"), base).allowed);
        assert!(limiter.check_at("s1", Some("bob"), base).allowed);
    }

    #[test]
    fn test_rejection_shape() {
        let limiter = limiter();
        let base = Instant::now();
        let mut last = limiter.check_at("s1", None, base);
        for _ in 0..3 {
            last = limiter.check_at("s1", None, base + Duration::from_millis(1500));
        }
        assert!(!last.allowed);

        let rejection = last.rejection();
        assert_eq!(rejection.status, 429);
        assert_eq!(rejection.retry_after_seconds, 9); // 8.5s rounded up

        let headers = rejection.headers();
        assert_eq!(headers[0], ("Retry-After", "9".to_string()));
        assert_eq!(headers[1], ("X-RateLimit-Limit", "3".to_string()));
        assert_eq!(headers[2], ("X-RateLimit-Remaining", "0".to_string()));

        let body = serde_json::to_value(rejection.body()).unwrap();
        assert_eq!(body["error"], "RATE_LIMITED");
        assert_eq!(body["retryAfterSeconds"], 9);
    }

    #[test]
    fn test_purge_drops_only_finished_windows() {
        let limiter = limiter();
        let base = Instant::now();
        limiter.check_at("old", None, base);
        limiter.check_at("fresh", None, base + Duration::from_secs(9));

        limiter.purge_expired_at(base + Duration::from_secs(11));
        assert_eq!(limiter.stats().tracked_keys, 1);
    }

    #[test]
    fn test_stats_count_outcomes() {
        let limiter = limiter();
        let base = Instant::now();
        for _ in 0..5 {
            limiter.check_at("s1", None, base);
        }
        let stats = limiter.stats();
        assert_eq!(stats.allowed_total, 3);
        assert_eq!(stats.rejected_total, 2);
    }
}

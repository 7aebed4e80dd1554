// src/limiter/mod.rs
//! Per-domain token-bucket rate limiting.
//!
//! Each domain gets a bucket holding up to `burst` tokens, refilled at
//! `requests_per_second`. Refill is computed lazily on every acquisition, so
//! no background task is needed. Token read-and-decrement happens under the
//! bucket's mutex; waiters queue FIFO per domain behind an async mutex.
//! Time, including sleeping, goes through the limiter's `Clock`.

mod cancel;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};

use crate::utils::error::RateLimitError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Domain key used for pages that are not fetched over the network.
pub const LOCAL_DOMAIN: &str = "local";

/// Named presets accepted by `RateLimitConfig::preset`.
pub const PRESETS: &[&str] = &["conservative", "moderate", "aggressive", "respectful_bot"];

/// Slowest accepted refill rate: one request every ~17 minutes.
pub const MIN_REQUESTS_PER_SECOND: f64 = 1e-3;

// Absorbs float drift from refill arithmetic.
const TOKEN_EPSILON: f64 = 1e-9;

/// The `rate_limiting` block of a template.
///
/// A named `preset` supplies the rate and burst; explicit
/// `requests_per_second`/`burst` keys override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RateLimitBlock")]
pub struct RateLimitConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    pub requests_per_second: f64,
    pub burst: u32,
    /// Longest an acquisition may wait; 0 waits indefinitely.
    pub timeout_seconds: f64,
}

/// `rate_limiting` as written in a template, before the preset is applied.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RateLimitBlock {
    enabled: Option<bool>,
    preset: Option<String>,
    requests_per_second: Option<f64>,
    burst: Option<u32>,
    timeout_seconds: Option<f64>,
}

impl From<RateLimitBlock> for RateLimitConfig {
    fn from(block: RateLimitBlock) -> Self {
        // An unknown preset falls back to the defaults here and is rejected by `validate`.
        let mut config = block
            .preset
            .as_deref()
            .and_then(RateLimitConfig::preset)
            .unwrap_or_default();
        config.preset = block.preset;
        if let Some(enabled) = block.enabled {
            config.enabled = enabled;
        }
        if let Some(rps) = block.requests_per_second {
            config.requests_per_second = rps;
        }
        if let Some(burst) = block.burst {
            config.burst = burst;
        }
        if let Some(timeout) = block.timeout_seconds {
            config.timeout_seconds = timeout;
        }
        config
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: None,
            requests_per_second: 1.0,
            burst: 1,
            timeout_seconds: 30.0,
        }
    }
}

impl RateLimitConfig {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            requests_per_second,
            burst,
            ..Self::default()
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        let (rps, burst) = match name.as_str() {
            "conservative" => (0.5, 2),
            "moderate" => (1.0, 5),
            "aggressive" => (5.0, 10),
            "respectful_bot" => (0.2, 1),
            _ => return None,
        };
        Some(Self {
            preset: Some(name),
            ..Self::new(rps, burst)
        })
    }

    pub fn with_timeout(mut self, timeout_seconds: f64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.preset {
            if Self::preset(name).is_none() {
                return Err(format!(
                    "unknown rate_limiting preset '{}' (expected one of: {})",
                    name,
                    PRESETS.join(", ")
                ));
            }
        }
        if !self.requests_per_second.is_finite() || self.requests_per_second < MIN_REQUESTS_PER_SECOND {
            return Err(format!(
                "rate_limiting requests_per_second must be at least {}, got {}",
                MIN_REQUESTS_PER_SECOND, self.requests_per_second
            ));
        }
        if self.burst == 0 {
            return Err("rate_limiting burst must be at least 1".to_string());
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds < 0.0 {
            return Err(format!(
                "rate_limiting timeout_seconds must be zero or positive, got {}",
                self.timeout_seconds
            ));
        }
        Ok(())
    }

    /// Brings an unvalidated config into range, logging what changed.
    fn sanitized(mut self) -> Self {
        if let Err(problem) = self.validate() {
            tracing::warn!("Adjusting rate limit config: {}", problem);
        }
        if !self.requests_per_second.is_finite() || self.requests_per_second < MIN_REQUESTS_PER_SECOND {
            self.requests_per_second = MIN_REQUESTS_PER_SECOND;
        }
        self.burst = self.burst.max(1);
        if !self.timeout_seconds.is_finite() || self.timeout_seconds < 0.0 {
            self.timeout_seconds = 0.0;
        }
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0.0)
            .then(|| Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::MAX))
    }

    fn capacity(&self) -> f64 {
        f64::from(self.burst.max(1))
    }
}

/// Bucket key for a page address: lowercased host plus any non-default port.
/// Anything without a network host (local paths, `file://`) keys as `local`.
pub fn domain_key(address: &str) -> String {
    match reqwest::Url::parse(address) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host.to_lowercase(), port),
            (Some(host), None) => host.to_lowercase(),
            (None, _) => LOCAL_DOMAIN.to_string(),
        },
        _ => LOCAL_DOMAIN.to_string(),
    }
}

pub type ClockSleep<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Time source for refill arithmetic and waiting.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;

    /// Completes once `duration` has passed on this clock.
    fn sleep(&self, duration: Duration) -> ClockSleep<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Tokio's clock; honours paused time in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub granted: u64,
    /// Grants that had to wait for a refill.
    pub delayed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub total_wait_ms: u64,
}

#[derive(Debug)]
struct BucketState {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.config.requests_per_second).clamp(0.0, self.config.capacity());
        self.last_refill = now;
    }
}

#[derive(Debug)]
struct DomainBucket {
    state: Mutex<BucketState>,
    queue: tokio::sync::Mutex<()>,
    stats: Mutex<DomainStats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DomainBucket {
    fn new(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            state: Mutex::new(BucketState { tokens: config.capacity(), last_refill: now, config }),
            queue: tokio::sync::Mutex::new(()),
            stats: Mutex::new(DomainStats::default()),
        }
    }

    fn config(&self) -> RateLimitConfig {
        lock(&self.state).config.clone()
    }

    /// Switches limits in place. Tokens already earned carry over, capped at
    /// the new burst.
    fn reconfigure(&self, config: RateLimitConfig, now: Instant) {
        let mut state = lock(&self.state);
        state.refill(now);
        state.tokens = state.tokens.min(config.capacity());
        state.config = config;
    }

    /// Takes a token, or reports how long until one is available.
    fn try_take(&self, now: Instant) -> Result<(), Duration> {
        let mut state = lock(&self.state);
        state.refill(now);
        if state.tokens + TOKEN_EPSILON >= 1.0 {
            state.tokens = (state.tokens - 1.0).max(0.0);
            return Ok(());
        }
        let seconds = (1.0 - state.tokens) / state.config.requests_per_second;
        let wait = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        Err(wait.max(Duration::from_micros(1)))
    }

    fn available(&self, now: Instant) -> f64 {
        let mut state = lock(&self.state);
        state.refill(now);
        state.tokens
    }

    fn record(&self, update: impl FnOnce(&mut DomainStats)) {
        update(&mut lock(&self.stats));
    }
}

pub struct DomainRateLimiter {
    default_config: RateLimitConfig,
    overrides: Mutex<HashMap<String, RateLimitConfig>>,
    buckets: Mutex<HashMap<String, Arc<DomainBucket>>>,
    clock: Arc<dyn Clock>,
}

impl DomainRateLimiter {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self::with_clock(default_config, Arc::new(TokioClock))
    }

    pub fn with_clock(default_config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_config: default_config.sanitized(),
            overrides: Mutex::new(HashMap::new()),
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn default_config(&self) -> &RateLimitConfig {
        &self.default_config
    }

    /// Overrides the limits for one domain. A domain without a bucket yet
    /// starts full; a live bucket keeps its tokens, capped at the new burst.
    pub fn set_domain_config(&self, domain: &str, config: RateLimitConfig) {
        let config = config.sanitized();
        tracing::info!(
            "Rate limit for '{}' set to {} req/s, burst {}",
            domain,
            config.requests_per_second,
            config.burst
        );
        lock(&self.overrides).insert(domain.to_string(), config.clone());
        if let Some(bucket) = lock(&self.buckets).get(domain) {
            bucket.reconfigure(config, self.clock.now());
        }
    }

    fn bucket(&self, domain: &str) -> Arc<DomainBucket> {
        let mut buckets = lock(&self.buckets);
        if let Some(bucket) = buckets.get(domain) {
            return Arc::clone(bucket);
        }
        let config = lock(&self.overrides)
            .get(domain)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        tracing::debug!("Creating rate limit bucket for '{}' ({:?})", domain, config);
        let bucket = Arc::new(DomainBucket::new(config, self.clock.now()));
        buckets.insert(domain.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// Waits for a token for `domain`. Returns how long the caller waited.
    pub async fn acquire(&self, domain: &str) -> Result<Duration, RateLimitError> {
        self.acquire_cancellable(domain, &CancelToken::never()).await
    }

    /// `acquire` keyed by the page address's domain.
    pub async fn acquire_url(&self, address: &str, cancel: &CancelToken) -> Result<Duration, RateLimitError> {
        self.acquire_cancellable(&domain_key(address), cancel).await
    }

    /// Like `acquire`, but gives up with `Cancelled` once `cancel` fires.
    /// Fails with `Timeout` as soon as the wait is known to exceed the
    /// configured timeout.
    pub async fn acquire_cancellable(&self, domain: &str, cancel: &CancelToken) -> Result<Duration, RateLimitError> {
        let bucket = self.bucket(domain);
        let config = bucket.config();
        if !config.enabled {
            bucket.record(|s| s.granted += 1);
            return Ok(Duration::ZERO);
        }
        if cancel.is_cancelled() {
            bucket.record(|s| s.cancelled += 1);
            return Err(RateLimitError::Cancelled { domain: domain.to_string() });
        }

        let start = self.clock.now();
        // A timeout too large to represent as an instant is no timeout.
        let limit = config
            .timeout()
            .and_then(|timeout| start.checked_add(timeout).map(|deadline| (timeout, deadline)));
        let timeout_error = |now: Instant| RateLimitError::Timeout {
            domain: domain.to_string(),
            waited: now.saturating_duration_since(start),
        };

        let wait_in_queue = async {
            let _turn = bucket.queue.lock().await;
            loop {
                let now = self.clock.now();
                match bucket.try_take(now) {
                    Ok(()) => return Ok(now.saturating_duration_since(start)),
                    Err(wait) => {
                        let past_deadline = limit.is_some_and(|(_, deadline)| {
                            now.checked_add(wait).map_or(true, |ready| ready > deadline)
                        });
                        if past_deadline {
                            return Err(timeout_error(now));
                        }
                        tracing::debug!("Rate limited on '{}', waiting {:?}", domain, wait);
                        self.clock.sleep(wait).await;
                    }
                }
            }
        };
        let bounded = async {
            match limit {
                Some((timeout, _)) => tokio::select! {
                    biased;
                    result = wait_in_queue => result,
                    _ = self.clock.sleep(timeout) => Err(timeout_error(self.clock.now())),
                },
                None => wait_in_queue.await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RateLimitError::Cancelled { domain: domain.to_string() }),
            result = bounded => result,
        };

        match &outcome {
            Ok(waited) => bucket.record(|s| {
                s.granted += 1;
                if !waited.is_zero() {
                    s.delayed += 1;
                    s.total_wait_ms += waited.as_millis() as u64;
                }
            }),
            Err(RateLimitError::Timeout { waited, .. }) => {
                tracing::warn!("Rate limit timeout for '{}' after {:?}", domain, waited);
                bucket.record(|s| s.timed_out += 1);
            }
            Err(RateLimitError::Cancelled { .. }) => {
                tracing::debug!("Rate limit wait for '{}' cancelled", domain);
                bucket.record(|s| s.cancelled += 1);
            }
        }
        outcome
    }

    /// Takes a token only if one is available right now.
    pub fn try_acquire(&self, domain: &str) -> bool {
        let bucket = self.bucket(domain);
        let granted = !bucket.config().enabled || bucket.try_take(self.clock.now()).is_ok();
        if granted {
            bucket.record(|s| s.granted += 1);
        }
        granted
    }

    pub fn available_tokens(&self, domain: &str) -> f64 {
        self.bucket(domain).available(self.clock.now())
    }

    pub fn stats(&self) -> BTreeMap<String, DomainStats> {
        lock(&self.buckets)
            .iter()
            .map(|(domain, bucket)| (domain.clone(), lock(&bucket.stats).clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug)]
    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            *lock(&self.now) += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *lock(&self.now)
        }

        fn sleep(&self, duration: Duration) -> ClockSleep<'_> {
            Box::pin(async move { self.advance(duration) })
        }
    }

    /// Runs ahead of tokio's clock by a fixed offset.
    #[derive(Debug)]
    struct OffsetClock {
        offset: Duration,
    }

    impl Clock for OffsetClock {
        fn now(&self) -> Instant {
            Instant::now() + self.offset
        }
    }

    fn limiter(rate: f64, burst: u32, timeout: f64) -> DomainRateLimiter {
        DomainRateLimiter::new(RateLimitConfig::new(rate, burst).with_timeout(timeout))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait_one_interval() {
        let limiter = limiter(2.0, 3, 0.0);
        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(assert_ok!(limiter.acquire("example.com").await), Duration::ZERO);
        }
        assert_eq!(Instant::now(), start);

        let waited = assert_ok!(limiter.acquire("example.com").await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(520), "{:?}", elapsed);
        assert_eq!(waited, elapsed);

        let stats = &limiter.stats()["example.com"];
        assert_eq!(stats.granted, 4);
        assert_eq!(stats.delayed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_early() {
        let limiter = limiter(0.1, 1, 1.0);
        assert_ok!(limiter.acquire("slow.org").await);
        let start = Instant::now();
        let err = assert_err!(limiter.acquire("slow.org").await);
        assert!(matches!(err, RateLimitError::Timeout { ref domain, .. } if domain == "slow.org"));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.stats()["slow.org"].timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_waiter_times_out_behind_earlier_waiter() {
        let limiter = Arc::new(limiter(1.0, 1, 1.5));
        assert_ok!(limiter.acquire("q.com").await);
        let first = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire("q.com").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire("q.com").await })
        };
        assert_ok!(first.await.unwrap());
        assert!(matches!(second.await.unwrap(), Err(RateLimitError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait_without_consuming() {
        let limiter = Arc::new(limiter(0.5, 1, 0.0));
        assert_ok!(limiter.acquire("a.com").await);

        let (handle, token) = cancel_pair();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire_cancellable("a.com", &token).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        assert_eq!(
            waiter.await.unwrap(),
            Err(RateLimitError::Cancelled { domain: "a.com".to_string() })
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(limiter.try_acquire("a.com"));
        assert_eq!(limiter.stats()["a.com"].cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_capacity() {
        let limiter = Arc::new(limiter(1.0, 2, 0.0));
        let start = Instant::now();
        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire("busy.com").await.map(|_| Instant::now())
                })
            })
            .collect();

        let mut granted_at = Vec::new();
        for task in tasks {
            granted_at.push(task.await.unwrap().unwrap());
        }
        granted_at.sort();

        assert_eq!(granted_at.iter().filter(|t| **t == start).count(), 2);
        // Any rolling one-second window holds at most `burst` grants.
        for window in granted_at.windows(3) {
            assert!(window[2] - window[0] >= Duration::from_millis(999));
        }
        let stats = &limiter.stats()["busy.com"];
        assert_eq!(stats.granted, 6);
        assert_eq!(stats.delayed, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_are_independent_and_overridable() {
        let limiter = limiter(1.0, 1, 1.0);
        limiter.set_domain_config("fast.com", RateLimitConfig::new(100.0, 5));
        assert_ok!(limiter.acquire("slow.com").await);
        for _ in 0..5 {
            assert!(limiter.try_acquire("fast.com"));
        }
        assert!(!limiter.try_acquire("fast.com"));
        assert!(!limiter.try_acquire("slow.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_limiter_never_waits() {
        let config = RateLimitConfig { enabled: false, ..RateLimitConfig::new(0.01, 1) };
        let limiter = DomainRateLimiter::new(config);
        for _ in 0..10 {
            assert_eq!(limiter.acquire("x.com").await, Ok(Duration::ZERO));
        }
    }

    #[tokio::test]
    async fn test_refill_is_lazy_and_clamped() {
        let clock = Arc::new(ManualClock { now: Mutex::new(Instant::now()) });
        let limiter = DomainRateLimiter::with_clock(RateLimitConfig::new(2.0, 3), clock.clone());
        for _ in 0..3 {
            assert!(limiter.try_acquire("d"));
        }
        assert!(!limiter.try_acquire("d"));
        clock.advance(Duration::from_millis(500));
        assert!((limiter.available_tokens("d") - 1.0).abs() < 1e-9);
        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.available_tokens("d"), 3.0);
    }

    #[tokio::test]
    async fn test_precancelled_token() {
        let limiter = limiter(1.0, 1, 0.0);
        let (handle, token) = cancel_pair();
        handle.cancel();
        assert!(matches!(
            limiter.acquire_cancellable("c.com", &token).await,
            Err(RateLimitError::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_waiting_follows_injected_clock() {
        let real_start = std::time::Instant::now();
        let clock = Arc::new(ManualClock { now: Mutex::new(Instant::now()) });
        let config = RateLimitConfig::new(0.5, 1).with_timeout(5.0);
        let limiter = DomainRateLimiter::with_clock(config, clock.clone());
        let start = clock.now();

        assert_eq!(limiter.acquire("m.com").await, Ok(Duration::ZERO));
        assert_eq!(limiter.acquire("m.com").await, Ok(Duration::from_secs(2)));
        assert_eq!(clock.now() - start, Duration::from_secs(2));
        assert!(real_start.elapsed() < Duration::from_secs(1));

        limiter.set_domain_config("m.com", RateLimitConfig::new(0.1, 1).with_timeout(5.0));
        let err = assert_err!(limiter.acquire("m.com").await);
        assert_eq!(err, RateLimitError::Timeout { domain: "m.com".to_string(), waited: Duration::ZERO });
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_clock_honours_timeout_window() {
        let clock = Arc::new(OffsetClock { offset: Duration::from_secs(120) });
        let limiter = DomainRateLimiter::with_clock(RateLimitConfig::new(1.0, 1).with_timeout(1.0), clock);
        let start = Instant::now();
        assert_ok!(limiter.acquire("o.com").await);
        let waited = assert_ok!(limiter.acquire("o.com").await);
        assert_eq!(waited, Duration::from_secs(1));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extreme_rates_are_clamped_instead_of_panicking() {
        let tiny = RateLimitConfig::new(1e-300, 1).with_timeout(1.0);
        assert!(tiny.validate().is_err());
        assert!(RateLimitConfig::new(0.0, 1).validate().is_err());

        let limiter = DomainRateLimiter::new(tiny);
        assert_eq!(limiter.default_config().requests_per_second, MIN_REQUESTS_PER_SECOND);
        assert_ok!(limiter.acquire("z.com").await);
        assert!(matches!(limiter.acquire("z.com").await, Err(RateLimitError::Timeout { .. })));

        limiter.set_domain_config("zero.com", RateLimitConfig::new(0.0, 0).with_timeout(f64::NAN));
        assert!(limiter.try_acquire("zero.com"));
        assert!(!limiter.try_acquire("zero.com"));
    }

    #[test]
    fn test_unrepresentable_wait_saturates() {
        let now = Instant::now();
        let bucket = DomainBucket::new(RateLimitConfig::new(1e-300, 1), now);
        assert_eq!(bucket.try_take(now), Ok(()));
        assert_eq!(bucket.try_take(now), Err(Duration::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfiguring_live_bucket_keeps_spent_tokens() {
        let limiter = limiter(1.0, 3, 0.0);
        for _ in 0..3 {
            assert!(limiter.try_acquire("live.com"));
        }
        limiter.set_domain_config("live.com", RateLimitConfig::new(1.0, 5));
        assert!(!limiter.try_acquire("live.com"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(limiter.available_tokens("live.com"), 5.0);
    }

    #[test]
    fn test_domain_key() {
        assert_eq!(domain_key("https://WWW.Example.com/a?b=1"), "www.example.com");
        assert_eq!(domain_key("http://localhost:8080/x"), "localhost:8080");
        assert_eq!(domain_key("https://example.com:443/"), "example.com");
        assert_eq!(domain_key("./pages/profile.html"), LOCAL_DOMAIN);
        assert_eq!(domain_key("file:///tmp/a.html"), LOCAL_DOMAIN);
    }

    #[test]
    fn test_presets_and_validation() {
        for name in PRESETS {
            let config = RateLimitConfig::preset(name).unwrap();
            assert!(config.validate().is_ok());
        }
        assert_eq!(RateLimitConfig::preset("moderate").unwrap().burst, 5);
        assert!(RateLimitConfig::preset("reckless").is_none());
        assert!(RateLimitConfig::new(1.0, 0).validate().is_err());
        assert_eq!(RateLimitConfig::default().with_timeout(0.0).timeout(), None);
        let parsed: RateLimitConfig = serde_json::from_str(r#"{"requests_per_second": 2.5}"#).unwrap();
        assert_eq!(parsed.burst, 1);
        assert!(parsed.enabled);

        let preset: RateLimitConfig = serde_json::from_str(r#"{"preset": "conservative"}"#).unwrap();
        assert_eq!((preset.requests_per_second, preset.burst), (0.5, 2));
        let tuned: RateLimitConfig = serde_json::from_str(r#"{"preset": "conservative", "burst": 4}"#).unwrap();
        assert_eq!((tuned.requests_per_second, tuned.burst), (0.5, 4));
        let unknown: RateLimitConfig = serde_json::from_str(r#"{"preset": "reckless"}"#).unwrap();
        assert!(unknown.validate().unwrap_err().contains("reckless"));
    }
}

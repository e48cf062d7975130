// netwatch-pipeline: Token-bucket rate limiting
// One global bucket plus a lazily-populated per-event-type map

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket
///
/// Refill happens on every `allow` call: tokens accrue at `rate` per
/// second up to `burst`. State writes are serialized by a mutex so the
/// bucket stays correct when consulted from several threads; counters
/// are relaxed atomics.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
    allowed: AtomicU64,
    denied: AtomicU64,
}

impl TokenBucket {
    /// Bucket starting full at `burst` tokens, refilling `rate`/sec
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }

    /// Take `n` tokens if available
    pub fn allow(&self, n: f64) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;

        if state.tokens >= n {
            state.tokens -= n;
            drop(state);
            self.allowed.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            drop(state);
            self.denied.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Remaining tokens after a refill to now
    pub fn available(&self) -> f64 {
        let now = Instant::now();
        let mut state = self.state.lock();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;
        state.tokens
    }

    pub fn allowed_count(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    pub fn denied_count(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }
}

/// Keyed-limiter counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterMapStats {
    pub buckets: u64,
    pub allowed: u64,
    pub denied: u64,
}

/// Per-event-type limiter map
///
/// Buckets are created lazily on first sight of a key, all sharing the
/// default rate/burst.
pub struct RateLimiterMap {
    buckets: DashMap<u32, TokenBucket>,
    default_rate: f64,
    default_burst: f64,
}

impl RateLimiterMap {
    pub fn new(default_rate: f64, default_burst: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            default_rate,
            default_burst,
        }
    }

    /// Take `n` tokens from the bucket for `key`, inserting it on first use
    pub fn allow(&self, key: u32, n: f64) -> bool {
        self.buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.default_rate, self.default_burst))
            .allow(n)
    }

    /// Install a specific bucket for one key
    pub fn set_bucket(&self, key: u32, rate: f64, burst: f64) {
        self.buckets.insert(key, TokenBucket::new(rate, burst));
    }

    pub fn stats(&self) -> RateLimiterMapStats {
        let mut allowed = 0;
        let mut denied = 0;
        for bucket in self.buckets.iter() {
            allowed += bucket.allowed_count();
            denied += bucket.denied_count();
        }
        RateLimiterMapStats {
            buckets: self.buckets.len() as u64,
            allowed,
            denied,
        }
    }
}

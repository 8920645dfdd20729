//! Per-client token-bucket admission control.
//!
//! Every client IP gets a bucket holding up to `burst` tokens that refills at
//! `requests_per_second`. A request is admitted when the bucket holds at least
//! one whole token. The bucket map is guarded by a single mutex; lookup,
//! insert, refill and decrement happen under one acquisition, and the idle
//! sweep takes the same lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst: u32,
    /// Buckets untouched for this long are dropped by the sweeper.
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst: 4,
            idle_timeout: Duration::from_secs(180),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {0}")]
pub struct RateLimitExceeded(pub IpAddr);

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_take(&mut self, now: Instant, rate: f64, capacity: f64) -> bool {
        self.last_seen = now;

        let elapsed = now.saturating_duration_since(self.last_refill);
        if !elapsed.is_zero() {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(capacity);
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    shutdown: Notify,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn allow(&self, ip: IpAddr) -> Result<(), RateLimitExceeded> {
        self.allow_at(ip, Instant::now())
    }

    /// [`allow`](Self::allow) against an explicit clock reading.
    pub fn allow_at(&self, ip: IpAddr, now: Instant) -> Result<(), RateLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }

        let capacity = f64::from(self.config.burst);
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::full(capacity, now));

        if bucket.try_take(now, self.config.requests_per_second, capacity) {
            Ok(())
        } else {
            Err(RateLimitExceeded(ip))
        }
    }

    /// Drops idle buckets and returns how many were removed.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < idle_timeout);
        before - buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Spawns the idle-bucket sweeper. It runs until [`shutdown`](Self::shutdown).
    pub fn start_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_idle();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.bucket_count(), "swept idle rate-limit buckets");
                        }
                    }
                    _ = self.shutdown.notified() => {
                        tracing::info!("rate limiter sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

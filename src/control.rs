// Control plane: admission control and circuit breakers
//
// Bounds concurrent quote requests served by the API and tracks per-maker
// failure ratios so unhealthy RFQ makers are skipped for a cooldown.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AdmissionControl {
    max_inflight: Arc<Semaphore>,
    // sliding one-second window of admitted requests
    limiter: Arc<Mutex<RateLimiter>>,
}

struct RateLimiter {
    rate_per_sec: u32,
    admitted: VecDeque<Instant>,
    window: Duration,
}

impl RateLimiter {
    /// Admit at `now` if the window has room.
    fn try_admit(&mut self, now: Instant) -> bool {
        while let Some(front) = self.admitted.front() {
            if now.duration_since(*front) > self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
        if (self.admitted.len() as u32) < self.rate_per_sec {
            self.admitted.push_back(now);
            return true;
        }
        false
    }
}

impl AdmissionControl {
    pub fn new(max_inflight: usize, rate_per_sec: Option<u32>) -> Self {
        let limiter = RateLimiter {
            rate_per_sec: rate_per_sec.unwrap_or(200),
            admitted: VecDeque::with_capacity(256),
            window: Duration::from_secs(1),
        };
        Self {
            max_inflight: Arc::new(Semaphore::new(max_inflight.max(1))),
            limiter: Arc::new(Mutex::new(limiter)),
        }
    }

    /// Wait for both a rate-limit slot and an inflight permit. The permit is
    /// released when dropped.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AggrError> {
        loop {
            let admitted = self.limiter.lock().await.try_admit(Instant::now());
            if admitted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let permit = Arc::clone(&self.max_inflight)
            .acquire_owned()
            .await
            .map_err(|_| AggrError::Transport("admission control closed".into()))?;
        Ok(AdmissionPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.max_inflight.available_permits()
    }
}

pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Outcomes remembered per key.
    pub window: usize,
    /// Failure ratio that opens the breaker.
    pub threshold: f32,
    /// Outcomes required before the ratio is trusted.
    pub min_samples: usize,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window: 100,
            threshold: 0.5,
            min_samples: 20,
            cooldown: Duration::from_secs(5),
        }
    }
}

/// Breakers keyed by RFQ maker endpoint.
#[derive(Clone, Default)]
pub struct CircuitBreakers {
    config: BreakerConfig,
    inner: Arc<Mutex<HashMap<String, Breaker>>>,
}

#[derive(Default)]
struct Breaker {
    outcomes: VecDeque<bool>, // true=failure
    open_until: Option<Instant>,
}

impl CircuitBreakers {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn is_open(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(b) = inner.get_mut(key) else {
            return false;
        };
        match b.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // half-open: start over with a clean window
                b.open_until = None;
                b.outcomes.clear();
                info!(maker = %key, "circuit closed after cooldown");
                false
            }
            None => false,
        }
    }

    pub async fn record_success(&self, key: &str) {
        self.record(key, false).await;
    }

    pub async fn record_failure(&self, key: &str) {
        self.record(key, true).await;
    }

    async fn record(&self, key: &str, failure: bool) {
        let cfg = self.config;
        let mut inner = self.inner.lock().await;
        let b = inner.entry(key.to_string()).or_default();
        if b.outcomes.len() >= cfg.window.max(1) {
            b.outcomes.pop_front();
        }
        b.outcomes.push_back(failure);

        let samples = b.outcomes.len();
        if samples < cfg.min_samples || b.open_until.is_some() {
            return;
        }
        let fails = b.outcomes.iter().filter(|f| **f).count();
        let rate = fails as f32 / samples as f32;
        if rate >= cfg.threshold {
            b.open_until = Some(Instant::now() + cfg.cooldown);
            debug!(maker = %key, rate, samples, "circuit opened");
        }
    }
}

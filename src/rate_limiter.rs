//! Rate limiter for Workspace API calls
//!
//! Sliding-window limiter shared by every check in a run. Checks execute on
//! blocking worker threads, so the limiter uses plain mutexes and
//! `std::thread::sleep` rather than async primitives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::api::{ApiError, WorkspaceApi};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum calls admitted inside one window
    pub max_calls: u32,
    /// Length of the sliding window
    pub period: Duration,
    /// Longest a blocking caller waits before giving up with a quota error
    pub max_wait: Duration,
    /// Whether to enable rate limiting (can be disabled for testing)
    pub enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_calls: 600,                    // Admin SDK default is 2400/min per project
            period: Duration::from_secs(60),
            max_wait: Duration::from_secs(30),
            enabled: true,
        }
    }
}

/// Sliding-window rate limiter
pub struct RateLimiter {
    config: RateLimiterConfig,
    /// Admission instants inside the current window, oldest first
    window: Mutex<VecDeque<Instant>>,
    /// Track total admitted calls for monitoring
    total_calls: AtomicU64,
}

impl RateLimiter {
    /// Create new rate limiter with default config
    pub fn new() -> Self {
        Self {
            config: RateLimiterConfig::default(),
            window: Mutex::new(VecDeque::new()),
            total_calls: AtomicU64::new(0),
        }
    }

    /// Create new rate limiter with custom config
    pub fn with_config(config: RateLimiterConfig) -> Result<Self, RateLimitError> {
        if config.max_calls == 0 {
            return Err(RateLimitError::InvalidConfig("max_calls must be > 0".into()));
        }
        if config.period.is_zero() {
            return Err(RateLimitError::InvalidConfig("period must be > 0".into()));
        }

        Ok(Self {
            window: Mutex::new(VecDeque::with_capacity(config.max_calls as usize)),
            config,
            total_calls: AtomicU64::new(0),
        })
    }

    fn lock_window(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        // A panic while holding the lock cannot leave the deque inconsistent
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.config.period {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit one call if the window has room, otherwise report how long to wait
    pub fn try_acquire(&self) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut window = self.lock_window();
        self.prune(&mut window, now);

        if window.len() >= self.config.max_calls as usize {
            let wait = window
                .front()
                .map(|oldest| self.config.period.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.config.period);
            return Err(RateLimitError::RateLimitExceeded { wait });
        }

        window.push_back(now);
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Block until a call is admitted, up to the configured `max_wait`
    pub fn acquire(&self) -> Result<(), RateLimitError> {
        let deadline = Instant::now() + self.config.max_wait;
        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(RateLimitError::RateLimitExceeded { wait }) => {
                    let now = Instant::now();
                    if now + wait > deadline {
                        return Err(RateLimitError::RateLimitExceeded { wait });
                    }
                    std::thread::sleep(wait.max(Duration::from_millis(1)));
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut window = self.lock_window();
        self.prune(&mut window, now);

        RateLimiterStats {
            calls_in_window: window.len() as u32,
            available: self.config.max_calls.saturating_sub(window.len() as u32),
            total_calls: self.total_calls.load(Ordering::Relaxed),
        }
    }

    /// Reset rate limiter (useful for testing)
    pub fn reset(&self) {
        self.lock_window().clear();
        self.total_calls.store(0, Ordering::Relaxed);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub calls_in_window: u32,
    pub available: u32,
    pub total_calls: u64,
}

/// Rate limit errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded. Please wait {wait:?} before retrying.")]
    RateLimitExceeded { wait: Duration },

    #[error("Invalid rate limiter configuration: {0}")]
    InvalidConfig(String),
}

/// Workspace client decorator that throttles every call through a shared limiter
pub struct RateLimitedApi<A> {
    inner: A,
    limiter: Arc<RateLimiter>,
}

impl<A: WorkspaceApi> RateLimitedApi<A> {
    pub fn new(inner: A, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

impl<A: WorkspaceApi> WorkspaceApi for RateLimitedApi<A> {
    fn call(&self, service: &str, operation: &str, params: &Value) -> Result<Value, ApiError> {
        if let Err(e) = self.limiter.acquire() {
            tracing::warn!(service, operation, error = %e, "throttled workspace call");
            return Err(ApiError::new(429, e.to_string()));
        }
        self.inner.call(service, operation, params)
    }
}

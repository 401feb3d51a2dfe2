use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drops keys with no hit inside `window`; returns how many were removed.
    pub fn sweep(&self, window: Duration) -> usize {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, hits| hits.back().map_or(false, |last| now.duration_since(*last) < window));
        before - self.store.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

/// Per-action limits; populated by [`crate::config::Config`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub auth_limit: usize,
    pub auth_window: Duration,
    pub post_limit: usize,
    pub post_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_limit: 10,
            auth_window: Duration::from_secs(60),
            post_limit: 5,
            post_window: Duration::from_secs(300),
            comment_limit: 20,
            comment_window: Duration::from_secs(60),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_auth(&self, ip: &str) -> bool { self.limiter.check(&format!("auth:{ip}"), self.cfg.auth_limit, self.cfg.auth_window) }
    pub fn allow_post(&self, ip: &str) -> bool { self.limiter.check(&format!("post:{ip}"), self.cfg.post_limit, self.cfg.post_window) }
    // replies share the comment bucket
    pub fn allow_comment(&self, ip: &str) -> bool { self.limiter.check(&format!("comment:{ip}"), self.cfg.comment_limit, self.cfg.comment_window) }

    /// Forget callers idle for longer than the widest window.
    pub fn sweep(&self) -> usize {
        let widest = self.cfg.auth_window.max(self.cfg.post_window).max(self.cfg.comment_window);
        self.limiter.sweep(widest)
    }
}

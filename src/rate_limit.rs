use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::models::Id;

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
}

/// Per-action budgets.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub post_limit: usize,
    pub post_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub report_limit: usize,
    pub report_window: Duration,
    pub upload_limit: usize,
    pub upload_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Post,
    Comment,
    Report,
    Upload,
}

impl Action {
    fn key(&self) -> &'static str {
        match self {
            Action::Post => "post",
            Action::Comment => "comment",
            Action::Report => "report",
            Action::Upload => "upload",
        }
    }
}

/// High level guard used by handlers, keyed by acting user.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    pub fn allow(&self, action: Action, user_id: Id) -> bool {
        let (limit, window) = match action {
            Action::Post => (self.cfg.post_limit, self.cfg.post_window),
            Action::Comment => (self.cfg.comment_limit, self.cfg.comment_window),
            Action::Report => (self.cfg.report_limit, self.cfg.report_window),
            Action::Upload => (self.cfg.upload_limit, self.cfg.upload_window),
        };
        self.limiter.check(&format!("{}:{user_id}", action.key()), limit, window)
    }
}

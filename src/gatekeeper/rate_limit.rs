//! Sliding-window rate limiter
//!
//! Keyed by `(client_id, action)`. Each key keeps the timestamps of the
//! requests it let through; timestamps older than the window are dropped
//! before counting, so capacity frees up gradually rather than all at once.
//! Keys left idle for a whole window are swept at most once per window.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

use super::request::AccessAction;
use crate::core::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    limit: usize,
    hits: HashMap<(String, AccessAction), VecDeque<DateTime<Utc>>>,
    last_pruned: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            window: Duration::milliseconds(config.window_ms as i64),
            limit: config.limit,
            hits: HashMap::new(),
            last_pruned: None,
        }
    }

    /// Record a request at `now` if the key is under its limit
    ///
    /// Returns false, without recording, when the limit is reached.
    pub fn try_acquire(&mut self, client_id: &str, action: AccessAction, now: DateTime<Utc>) -> bool {
        self.prune_if_due(now);

        let window = self.window;
        let entries = self
            .hits
            .entry((client_id.to_string(), action))
            .or_default();

        while entries.front().is_some_and(|at| now - *at >= window) {
            entries.pop_front();
        }

        if entries.len() >= self.limit {
            return false;
        }
        entries.push_back(now);
        true
    }

    fn prune_if_due(&mut self, now: DateTime<Utc>) {
        let due = match self.last_pruned {
            Some(at) => now - at >= self.window,
            None => true,
        };
        if due {
            self.prune(now);
            self.last_pruned = Some(now);
        }
    }

    /// Forget every key with no timestamps left in the window
    fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.hits.retain(|_, entries| {
            entries.retain(|at| now - *at < window);
            !entries.is_empty()
        });
    }
}

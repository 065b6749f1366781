//! Fixed-window limiter for join attempts.
//!
//! Keys are namespaced by the caller (`ip:`, `device:`, `account:`). Windows
//! live in process memory, so with several instances each one enforces its
//! own budget.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// `limit` attempts per `window`; a limit of 0 disables the limiter
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::minutes(1))
    }

    /// Count one attempt against every key; fails if any key is over budget
    pub async fn check(&self, keys: &[String], now: DateTime<Utc>) -> AppResult<()> {
        if self.limit == 0 || keys.is_empty() {
            return Ok(());
        }

        let mut windows = self.windows.lock().await;
        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now - w.started_at < window);
        }

        // Check all keys before counting so a rejected attempt costs nothing
        for key in keys {
            if let Some(w) = windows.get(key) {
                if now - w.started_at < self.window && w.count >= self.limit {
                    let retry_after = (w.started_at + self.window - now).num_seconds().max(1);
                    debug!("Rate limit hit for {}", key);
                    return Err(AppError::RateLimited {
                        retry_after_secs: retry_after as u64,
                    });
                }
            }
        }

        for key in keys {
            let w = windows.entry(key.clone()).or_insert(Window {
                started_at: now,
                count: 0,
            });
            if now - w.started_at >= self.window {
                w.started_at = now;
                w.count = 0;
            }
            w.count += 1;
        }

        Ok(())
    }
}

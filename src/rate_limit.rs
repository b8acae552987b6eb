//! 登录失败计数与限流。

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Counter key: one per client address and one per submitted username.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RateKey {
    Address(IpAddr),
    User(String),
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateKey::Address(ip) => write!(f, "ip_{ip}"),
            RateKey::User(user) => write!(f, "user_{user}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Blocked,
}

impl RateDecision {
    pub fn is_blocked(self) -> bool {
        matches!(self, RateDecision::Blocked)
    }
}

#[derive(Debug)]
struct AttemptEntry {
    count: u32,
    last_access: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    attempts: Mutex<HashMap<RateKey, AttemptEntry>>,
    max_failed: u32,
    block_time: Duration,
}

impl RateLimiter {
    pub fn new(max_failed: u32, block_time: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_failed,
            block_time,
        }
    }

    /// 记录一次尝试并判断是否应拦截。
    ///
    /// The counter and timestamp are updated even when the key is already
    /// blocked, so a key that keeps trying stays blocked.
    pub async fn check(&self, key: &RateKey) -> RateDecision {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &RateKey, now: Instant) -> RateDecision {
        let mut attempts = self.attempts.lock().await;
        let entry = attempts.entry(key.clone()).or_insert(AttemptEntry {
            count: 0,
            last_access: now,
        });

        if now.saturating_duration_since(entry.last_access) > self.block_time {
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        entry.last_access = now;

        if entry.count > self.max_failed {
            warn!(key = %key, attempts = entry.count, "login rate limited");
            RateDecision::Blocked
        } else {
            RateDecision::Allowed
        }
    }

    /// 登录成功后清除计数。
    pub async fn clear(&self, key: &RateKey) {
        let mut attempts = self.attempts.lock().await;
        attempts.remove(key);
    }

    /// 清理窗口已过期的记录。
    pub async fn prune(&self) {
        self.prune_at(Instant::now()).await;
    }

    async fn prune_at(&self, now: Instant) {
        let mut attempts = self.attempts.lock().await;
        attempts.retain(|_, entry| now.saturating_duration_since(entry.last_access) <= self.block_time);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.attempts.lock().await.len()
    }
}

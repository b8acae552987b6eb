//! 限流记录与失效分享令牌的后台清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{RATE_LIMIT_PRUNE_INTERVAL_SECS, TOKEN_PRUNE_INTERVAL_SECS};
use crate::rate_limit::RateLimiter;
use crate::session::SessionStore;
use crate::token::TokenStore;

/// 启动后台任务（限流记录清理与失效令牌清理）。
pub fn spawn_background_tasks(
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenStore>,
) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(RATE_LIMIT_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            limiter.prune().await;
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TOKEN_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let removed = tokens.prune_orphaned(&sessions).await;
            if removed > 0 {
                debug!(removed, "pruned orphaned share links");
            }
        }
    });
}

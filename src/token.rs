//! 分享链接令牌：把已登录会话中的单个文件映射为无需登录的下载地址。
//!
//! A token carries no expiry of its own. It resolves for as long as the
//! issuing session keeps a live connection to the share, and stops
//! resolving the moment that session logs out.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connection::ConnectionHandle;
use crate::ids::{TOKEN_ID_BYTES, random_id};
use crate::session::{SessionStore, session_tag};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareGrant {
    pub session_id: String,
    pub share: String,
    /// Share-relative file path with a leading `/`.
    pub file_path: String,
}

#[derive(Debug)]
pub struct ResolvedGrant {
    pub grant: ShareGrant,
    pub handle: Arc<ConnectionHandle>,
}

#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: Mutex<HashMap<String, ShareGrant>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为文件签发令牌。调用方需先确认会话持有该共享的连接且路径是文件。
    pub async fn issue(&self, session_id: &str, share: &str, file_path: &str) -> String {
        let file_path = if file_path.starts_with('/') {
            file_path.to_string()
        } else {
            format!("/{file_path}")
        };
        let mut tokens = self.tokens.lock().await;
        let token = loop {
            let candidate = random_id(TOKEN_ID_BYTES);
            if !tokens.contains_key(&candidate) {
                break candidate;
            }
        };
        info!(
            share,
            path = %file_path,
            session = session_tag(session_id),
            "share link issued"
        );
        tokens.insert(
            token.clone(),
            ShareGrant {
                session_id: session_id.to_string(),
                share: share.to_string(),
                file_path,
            },
        );
        token
    }

    /// 解析令牌：令牌存在、会话仍有该共享的可用连接，且文件路径以
    /// `/` + `requested_suffix` 结尾时才成功。
    pub async fn resolve(
        &self,
        sessions: &SessionStore,
        token: &str,
        requested_suffix: &str,
    ) -> Option<ResolvedGrant> {
        let grant = self.tokens.lock().await.get(token).cloned()?;
        let suffix = requested_suffix.trim_start_matches('/');
        if suffix.is_empty() || !grant.file_path.ends_with(&format!("/{suffix}")) {
            debug!(share = %grant.share, "share link path mismatch");
            return None;
        }
        let handle = sessions
            .resolve(&grant.session_id, &grant.share)
            .await
            .ok()?;
        Some(ResolvedGrant { grant, handle })
    }

    /// 清理所属会话已不存在的令牌，这些令牌再也无法解析。
    pub async fn prune_orphaned(&self, sessions: &SessionStore) -> usize {
        let live = sessions.session_ids().await;
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, grant| live.contains(&grant.session_id));
        before - tokens.len()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

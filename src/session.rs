//! 会话管理：每个浏览器会话按共享名保存一个后端连接。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::{BackendError, Connector, Credentials, ShareTarget};
use crate::connection::ConnectionHandle;
use crate::ids::{SESSION_ID_BYTES, random_id};

type ShareHandles = HashMap<String, Arc<ConnectionHandle>>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,
    /// Wrong credentials and an unreachable share look the same here: the
    /// only check available is listing the share root.
    #[error("login rejected by backend: {0}")]
    Rejected(#[source] BackendError),
}

#[derive(Debug, thiserror::Error)]
#[error("not logged in")]
pub struct NotLoggedIn;

#[derive(Debug)]
pub struct Authenticated {
    pub session_id: String,
    /// True when a new session was created and the cookie must be set.
    pub created: bool,
    pub handle: Arc<ConnectionHandle>,
}

pub struct SessionStore {
    connector: Arc<dyn Connector>,
    sessions: Mutex<HashMap<String, ShareHandles>>,
}

impl SessionStore {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 使用凭据登录共享，成功后加入已有会话或创建新会话。
    ///
    /// The backend has no dedicated login call, so opening a connection and
    /// listing the share root is the credential check. A handle replaced on
    /// the same share is closed after the store lock is released.
    pub async fn authenticate(
        &self,
        session_id: Option<&str>,
        share: &str,
        target: &ShareTarget,
        credentials: &Credentials,
    ) -> Result<Authenticated, AuthError> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let handle = ConnectionHandle::open(self.connector.as_ref(), share, target, credentials)
            .await
            .map_err(AuthError::Rejected)?;
        if let Err(err) = handle.list_entries("").await {
            handle.close().await;
            warn!(share, user = %credentials.username, error = %err, "login rejected");
            return Err(AuthError::Rejected(err));
        }
        let handle = Arc::new(handle);

        let mut sessions = self.sessions.lock().await;
        let (session_id, created) = match session_id.filter(|id| sessions.contains_key(*id)) {
            Some(id) => (id.to_string(), false),
            None => (unused_session_id(&sessions), true),
        };
        let previous = sessions
            .entry(session_id.clone())
            .or_default()
            .insert(share.to_string(), handle.clone());
        drop(sessions);
        if let Some(previous) = previous {
            previous.close().await;
        }
        info!(
            share,
            user = %credentials.username,
            session = session_tag(&session_id),
            created,
            "login succeeded"
        );

        Ok(Authenticated {
            session_id,
            created,
            handle,
        })
    }

    /// 注销会话并关闭其全部连接；未知会话直接忽略。
    pub async fn logout(&self, session_id: &str) {
        let removed = self.sessions.lock().await.remove(session_id);
        let Some(shares) = removed else {
            return;
        };
        for handle in shares.values() {
            handle.close().await;
        }
        info!(
            session = session_tag(session_id),
            shares = shares.len(),
            "logged out"
        );
    }

    /// 查找会话在共享上的连接，传输已断开时丢弃连接并视为未登录。
    pub async fn resolve(
        &self,
        session_id: &str,
        share: &str,
    ) -> Result<Arc<ConnectionHandle>, NotLoggedIn> {
        let mut sessions = self.sessions.lock().await;
        let shares = sessions.get_mut(session_id).ok_or(NotLoggedIn)?;
        let handle = shares.get(share).cloned().ok_or(NotLoggedIn)?;
        if handle.is_healthy() {
            return Ok(handle);
        }

        shares.remove(share);
        drop(sessions);
        warn!(
            share,
            session = session_tag(session_id),
            "backend connection lost, discarding"
        );
        handle.close().await;
        Err(NotLoggedIn)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    /// 返回会话已登录的共享名。
    pub async fn logged_in_shares(&self, session_id: &str) -> HashSet<String> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|shares| shares.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn session_ids(&self) -> HashSet<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }
}

fn unused_session_id(sessions: &HashMap<String, ShareHandles>) -> String {
    loop {
        let id = random_id(SESSION_ID_BYTES);
        if !sessions.contains_key(&id) {
            return id;
        }
    }
}

/// Short prefix of a session id, safe to log.
pub fn session_tag(session_id: &str) -> &str {
    session_id.get(..6).unwrap_or(session_id)
}

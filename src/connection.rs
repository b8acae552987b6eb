//! 后端连接句柄：打开、列目录、读取文件、关闭与健康检查。

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::backend::{
    BackendClient, BackendError, Connector, Credentials, DirEntry, FileReader, ShareTarget,
};

/// One backend client bound to one (user, password, share) triple.
pub struct ConnectionHandle {
    share: String,
    username: String,
    client: Box<dyn BackendClient>,
    closed: AtomicBool,
}

impl ConnectionHandle {
    /// 使用给定凭据建立到共享的连接。
    pub async fn open(
        connector: &dyn Connector,
        share: &str,
        target: &ShareTarget,
        credentials: &Credentials,
    ) -> Result<Self, BackendError> {
        let client = connector.connect(target, credentials).await?;
        Ok(Self {
            share: share.to_string(),
            username: credentials.username.clone(),
            client,
            closed: AtomicBool::new(false),
        })
    }

    pub fn share(&self) -> &str {
        &self.share
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn list_entries(&self, path: &str) -> Result<Vec<DirEntry>, BackendError> {
        self.client.list_entries(path).await
    }

    pub async fn open_read(&self, path: &str) -> Result<Box<dyn FileReader>, BackendError> {
        self.client.open_read(path).await
    }

    /// 连接未关闭且底层传输仍可用。
    pub fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.client.is_connected()
    }

    /// 关闭连接；重复调用不会再次关闭后端客户端。
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(share = %self.share, user = %self.username, "closing backend connection");
        self.client.close().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("share", &self.share)
            .field("username", &self.username)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

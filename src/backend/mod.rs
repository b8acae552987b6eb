//! 后端文件服务接口抽象。
//!
//! 网关本身不实现后端协议：[`Connector`] 按共享与凭据创建 [`BackendClient`]，
//! 客户端提供目录列表与按需拉取的分块读取。

pub mod local;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;

pub use local::LocalConnector;

/// 单个共享的连接参数。配置中可以直接写地址字符串，也可以写完整对象。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "ShareTargetRepr")]
pub struct ShareTarget {
    /// 共享的后端地址（本地连接器下为目录）。
    pub target: String,
    /// 允许的账号密码，仅本地连接器使用。
    pub users: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShareTargetRepr {
    Address(String),
    Full {
        target: String,
        #[serde(default)]
        users: HashMap<String, String>,
    },
}

impl From<ShareTargetRepr> for ShareTarget {
    fn from(repr: ShareTargetRepr) -> Self {
        match repr {
            ShareTargetRepr::Address(target) => ShareTarget {
                target,
                users: HashMap::new(),
            },
            ShareTargetRepr::Full { target, users } => ShareTarget { target, users },
        }
    }
}

/// 登录表单提交的凭据。
#[derive(Clone)]
pub struct Credentials {
    pub domain: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("access denied")]
    AccessDenied,
    #[error("object name not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("connection closed")]
    Disconnected,
    #[error("logon failure")]
    LogonFailure,
    #[error("backend error: {0}")]
    Other(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound,
            std::io::ErrorKind::PermissionDenied => BackendError::AccessDenied,
            _ => BackendError::Other(err.to_string()),
        }
    }
}

/// 创建绑定到单个共享与凭据的后端客户端。
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        share: &ShareTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn BackendClient>, BackendError>;
}

/// 与单个共享的有状态连接。
///
/// Paths are share-relative and use `/` as separator; the empty string is
/// the share root.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn list_entries(&self, path: &str) -> Result<Vec<DirEntry>, BackendError>;

    /// 打开文件，返回的读取器已知文件总长度。
    async fn open_read(&self, path: &str) -> Result<Box<dyn FileReader>, BackendError>;

    /// 底层传输是否仍可写。
    fn is_connected(&self) -> bool;

    async fn close(&self);
}

/// 已打开、尚未开始读取数据的文件。
#[async_trait]
pub trait FileReader: Send {
    fn size(&self) -> u64;

    /// 从 `start` 开始读取 `len` 字节。
    async fn read(
        self: Box<Self>,
        start: u64,
        len: u64,
    ) -> Result<Box<dyn ChunkSource>, BackendError>;
}

/// 有限且不可重启的数据块序列，每次调用才产生下一个块。
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, BackendError>>;

    /// 通知后端不再请求后续数据。
    async fn stop(self: Box<Self>);
}

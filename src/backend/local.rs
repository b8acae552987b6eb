//! 本地目录后端：每个共享对应一个本地目录，用于开发与测试。
//!
//! Credentials are checked against the share's `users` table on the first
//! request, the way a remote file server rejects a session at its first
//! tree operation.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, ErrorKind, Take};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{
    BackendClient, BackendError, ChunkSource, Connector, Credentials, DirEntry, FileReader,
    ShareTarget,
};

const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct LocalConnector;

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(
        &self,
        share: &ShareTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn BackendClient>, BackendError> {
        let authorized = share
            .users
            .get(&credentials.username)
            .is_some_and(|password| *password == credentials.password);
        Ok(Box::new(LocalClient::new(
            PathBuf::from(&share.target),
            authorized,
        )))
    }
}

#[derive(Debug)]
pub struct LocalClient {
    root: PathBuf,
    authorized: bool,
    connected: AtomicBool,
}

impl LocalClient {
    pub fn new(root: PathBuf, authorized: bool) -> Self {
        Self {
            root,
            authorized,
            connected: AtomicBool::new(true),
        }
    }

    fn ensure_usable(&self) -> Result<(), BackendError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(BackendError::Disconnected);
        }
        if !self.authorized {
            return Err(BackendError::LogonFailure);
        }
        Ok(())
    }

    async fn resolve_checked(&self, relative: &str) -> Result<PathBuf, BackendError> {
        let target = self.resolve(relative)?;
        self.ensure_no_symlink_components(&target).await?;
        Ok(target)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, BackendError> {
        let mut normalized = PathBuf::new();
        let trimmed = relative.trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => normalized.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(BackendError::AccessDenied);
                }
            }
        }
        Ok(self.root.join(normalized))
    }

    async fn ensure_no_symlink_components(&self, target: &Path) -> Result<(), BackendError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| BackendError::AccessDenied)?;
        let mut current = self.root.clone();
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(BackendError::AccessDenied);
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(BackendError::NotFound);
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(BackendError::NotFound);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl BackendClient for LocalClient {
    async fn list_entries(&self, path: &str) -> Result<Vec<DirEntry>, BackendError> {
        self.ensure_usable()?;
        let target = self.resolve_checked(path).await?;
        if !fs::metadata(&target).await?.is_dir() {
            return Err(BackendError::NotADirectory);
        }

        let mut dir = fs::read_dir(&target).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
            });
        }
        debug!(path, count = entries.len(), "local listing");
        Ok(entries)
    }

    async fn open_read(&self, path: &str) -> Result<Box<dyn FileReader>, BackendError> {
        self.ensure_usable()?;
        let target = self.resolve_checked(path).await?;
        let metadata = fs::metadata(&target).await?;
        if metadata.is_dir() {
            return Err(BackendError::Other("file is a directory".into()));
        }
        let file = File::open(&target).await?;
        Ok(Box::new(LocalFileReader {
            file,
            size: metadata.len(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

struct LocalFileReader {
    file: File,
    size: u64,
}

#[async_trait]
impl FileReader for LocalFileReader {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read(
        self: Box<Self>,
        start: u64,
        len: u64,
    ) -> Result<Box<dyn ChunkSource>, BackendError> {
        let mut file = self.file;
        file.seek(SeekFrom::Start(start)).await?;
        Ok(Box::new(LocalChunks {
            stream: ReaderStream::with_capacity(file.take(len), READ_CHUNK_SIZE),
        }))
    }
}

struct LocalChunks {
    stream: ReaderStream<Take<File>>,
}

#[async_trait]
impl ChunkSource for LocalChunks {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, BackendError>> {
        self.stream
            .next()
            .await
            .map(|chunk| chunk.map_err(BackendError::from))
    }

    async fn stop(self: Box<Self>) {
        debug!("local read stopped early");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn share(root: &Path) -> ShareTarget {
        ShareTarget {
            target: root.to_string_lossy().to_string(),
            users: HashMap::from([("alice".to_string(), "secret".to_string())]),
        }
    }

    fn credentials(password: &str) -> Credentials {
        Credentials {
            domain: String::new(),
            username: "alice".into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn wrong_password_fails_on_first_listing() {
        let temp = tempdir().expect("tempdir");
        let client = LocalConnector
            .connect(&share(temp.path()), &credentials("nope"))
            .await
            .expect("connect");
        let result = client.list_entries("").await;
        assert!(matches!(result, Err(BackendError::LogonFailure)));
    }

    #[tokio::test]
    async fn listing_a_file_reports_not_a_directory() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("notes.txt"), b"hello").expect("write");
        let client = LocalConnector
            .connect(&share(temp.path()), &credentials("secret"))
            .await
            .expect("connect");

        let result = client.list_entries("notes.txt").await;
        assert!(matches!(result, Err(BackendError::NotADirectory)));
        let missing = client.list_entries("missing").await;
        assert!(matches!(missing, Err(BackendError::NotFound)));
    }

    #[tokio::test]
    async fn parent_components_are_denied() {
        let temp = tempdir().expect("tempdir");
        let client = LocalConnector
            .connect(&share(temp.path()), &credentials("secret"))
            .await
            .expect("connect");
        let result = client.list_entries("../").await;
        assert!(matches!(result, Err(BackendError::AccessDenied)));
    }

    #[tokio::test]
    async fn reads_the_requested_range() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("data.bin"), b"0123456789").expect("write");
        let client = LocalConnector
            .connect(&share(temp.path()), &credentials("secret"))
            .await
            .expect("connect");

        let reader = client.open_read("/data.bin").await.expect("open");
        assert_eq!(reader.size(), 10);
        let mut chunks = reader.read(3, 4).await.expect("read");
        let mut body = Vec::new();
        while let Some(chunk) = chunks.next_chunk().await {
            body.extend_from_slice(&chunk.expect("chunk"));
        }
        assert_eq!(body, b"3456");
    }

    #[tokio::test]
    async fn closed_client_refuses_requests() {
        let temp = tempdir().expect("tempdir");
        let client = LocalConnector
            .connect(&share(temp.path()), &credentials("secret"))
            .await
            .expect("connect");
        client.close().await;
        assert!(!client.is_connected());
        assert!(matches!(
            client.list_entries("").await,
            Err(BackendError::Disconnected)
        ));
    }
}

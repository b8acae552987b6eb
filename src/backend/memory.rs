//! 测试用内存后端，记录连接、关闭与分块读取次数。

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{
    BackendClient, BackendError, ChunkSource, Connector, Credentials, DirEntry, FileReader,
    ShareTarget,
};

#[derive(Debug, Default)]
pub struct ClientState {
    pub connected: AtomicBool,
    pub closes: AtomicUsize,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: Mutex<HashMap<String, Bytes>>,
    denied: Mutex<Vec<String>>,
    clients: Mutex<Vec<Arc<ClientState>>>,
    chunk_size: usize,
    chunks_served: AtomicUsize,
    stops: AtomicUsize,
    /// When set, `close` waits for a notification before completing.
    close_gate: Option<Arc<Notify>>,
    closes_started: AtomicUsize,
}

#[derive(Clone, Debug)]
pub struct MemoryConnector {
    state: Arc<MemoryState>,
}

impl MemoryConnector {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            state: Arc::new(MemoryState {
                chunk_size,
                ..MemoryState::default()
            }),
        }
    }

    pub fn with_file(self, path: &str, data: impl Into<Bytes>) -> Self {
        self.state
            .files
            .lock()
            .expect("files lock")
            .insert(path.trim_start_matches('/').to_string(), data.into());
        self
    }

    pub fn deny(self, path: &str) -> Self {
        self.state
            .denied
            .lock()
            .expect("denied lock")
            .push(path.trim_start_matches('/').to_string());
        self
    }

    /// Only valid before the connector is cloned.
    pub fn with_close_gate(mut self, gate: Arc<Notify>) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.close_gate = Some(gate);
        }
        self
    }

    pub fn closes_started(&self) -> usize {
        self.state.closes_started.load(Ordering::SeqCst)
    }

    pub fn clients(&self) -> Vec<Arc<ClientState>> {
        self.state.clients.lock().expect("clients lock").clone()
    }

    pub fn chunks_served(&self) -> usize {
        self.state.chunks_served.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        share: &ShareTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn BackendClient>, BackendError> {
        let client = Arc::new(ClientState {
            connected: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
        });
        self.state
            .clients
            .lock()
            .expect("clients lock")
            .push(client.clone());
        let authorized = share
            .users
            .get(&credentials.username)
            .is_some_and(|password| *password == credentials.password);
        Ok(Box::new(MemoryClient {
            state: self.state.clone(),
            client,
            authorized,
        }))
    }
}

struct MemoryClient {
    state: Arc<MemoryState>,
    client: Arc<ClientState>,
    authorized: bool,
}

impl MemoryClient {
    fn check(&self, path: &str) -> Result<String, BackendError> {
        if !self.client.connected.load(Ordering::SeqCst) {
            return Err(BackendError::Disconnected);
        }
        if !self.authorized {
            return Err(BackendError::LogonFailure);
        }
        let path = path.trim_matches('/').to_string();
        if self
            .state
            .denied
            .lock()
            .expect("denied lock")
            .iter()
            .any(|denied| *denied == path)
        {
            return Err(BackendError::AccessDenied);
        }
        Ok(path)
    }
}

#[async_trait]
impl BackendClient for MemoryClient {
    async fn list_entries(&self, path: &str) -> Result<Vec<DirEntry>, BackendError> {
        let path = self.check(path)?;
        let files = self.state.files.lock().expect("files lock");
        if files.contains_key(&path) {
            return Err(BackendError::NotADirectory);
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut entries: HashMap<String, DirEntry> = HashMap::new();
        for (name, data) in files.iter() {
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    entries.entry(dir.to_string()).or_insert(DirEntry {
                        name: dir.to_string(),
                        is_dir: true,
                        size: 0,
                    });
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        DirEntry {
                            name: rest.to_string(),
                            is_dir: false,
                            size: data.len() as u64,
                        },
                    );
                }
            }
        }
        if entries.is_empty() && !path.is_empty() {
            return Err(BackendError::NotFound);
        }
        Ok(entries.into_values().collect())
    }

    async fn open_read(&self, path: &str) -> Result<Box<dyn FileReader>, BackendError> {
        let path = self.check(path)?;
        let data = self
            .state
            .files
            .lock()
            .expect("files lock")
            .get(&path)
            .cloned()
            .ok_or(BackendError::NotFound)?;
        Ok(Box::new(MemoryReader {
            state: self.state.clone(),
            data,
        }))
    }

    fn is_connected(&self) -> bool {
        self.client.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.state.closes_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.state.close_gate {
            gate.notified().await;
        }
        self.client.connected.store(false, Ordering::SeqCst);
        self.client.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryReader {
    state: Arc<MemoryState>,
    data: Bytes,
}

#[async_trait]
impl FileReader for MemoryReader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read(
        self: Box<Self>,
        start: u64,
        len: u64,
    ) -> Result<Box<dyn ChunkSource>, BackendError> {
        let start = start as usize;
        let end = start + len as usize;
        Ok(Box::new(MemoryChunks {
            state: self.state.clone(),
            remaining: self.data.slice(start..end),
        }))
    }
}

struct MemoryChunks {
    state: Arc<MemoryState>,
    remaining: Bytes,
}

#[async_trait]
impl ChunkSource for MemoryChunks {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, BackendError>> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.state.chunk_size.min(self.remaining.len());
        self.state.chunks_served.fetch_add(1, Ordering::SeqCst);
        Some(Ok(self.remaining.split_to(take)))
    }

    async fn stop(self: Box<Self>) {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
    }
}

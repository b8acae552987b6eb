//! CLI arguments, settings file and server configuration defaults.

use clap::Parser;
use serde::Deserialize;
use shadow_rs::formatcp;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::ShareTarget;
use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const AUTH_COOKIE_NAME: &str = "AXO_SHARE_SESSION";
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";
pub const DEFAULT_FAILED_REQUESTS: u32 = 5;
pub const DEFAULT_BLOCK_TIME_SECS: u64 = 300;
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const RATE_LIMIT_PRUNE_INTERVAL_SECS: u64 = 300;
pub const TOKEN_PRUNE_INTERVAL_SECS: u64 = 900;

/// CLI arguments and environment configuration for the gateway.
#[derive(Parser, Debug)]
#[command(name = "axo-share", version = VERSION_INFO, about = "AxoShare file gateway")]
pub struct Args {
    #[arg(
        short = 'f',
        long,
        env = "AXO_SHARE_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Path to the JSON settings file"
    )]
    pub config: PathBuf,
    #[arg(
        short = 'b',
        long = "bind",
        env = "AXO_SHARE_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP/HTTPS"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "AXO_SHARE_PORT",
        help = "HTTP port, overrides serverPort from the settings file"
    )]
    pub port: Option<u16>,
    #[arg(
        short = 'P',
        long,
        env = "AXO_SHARE_HTTPS_PORT",
        help = "HTTPS port, HTTPS stays off when unset"
    )]
    pub https_port: Option<u16>,
    #[arg(short = 'c', long, env = "AXO_SHARE_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(short = 'k', long, env = "AXO_SHARE_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings file must include shares")]
    NoShares,
}

/// 配置文件内容。
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// 共享名到后端连接参数的映射，按名称排序展示。
    #[serde(default)]
    pub shares: BTreeMap<String, ShareTarget>,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_failed_requests")]
    pub failed_requests: u32,
    /// 限流窗口（秒）。
    #[serde(default = "default_block_time")]
    pub block_time: u64,
    #[serde(default = "default_allow_sharing")]
    pub allow_sharing: bool,
    pub external_url: Option<String>,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    pub legal_notice_url: Option<String>,
    pub privacy_url: Option<String>,
}

fn default_failed_requests() -> u32 {
    DEFAULT_FAILED_REQUESTS
}

fn default_block_time() -> u64 {
    DEFAULT_BLOCK_TIME_SECS
}

fn default_allow_sharing() -> bool {
    true
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

impl Settings {
    /// 读取并校验配置文件。
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_from(&raw, path)
    }

    #[cfg(test)]
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::parse_from(raw, Path::new("<inline>"))
    }

    fn parse_from(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut settings: Settings =
            serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if settings.shares.is_empty() {
            return Err(ConfigError::NoShares);
        }
        // 0 means "unset" for numeric settings.
        if settings.failed_requests == 0 {
            settings.failed_requests = DEFAULT_FAILED_REQUESTS;
        }
        if settings.block_time == 0 {
            settings.block_time = DEFAULT_BLOCK_TIME_SECS;
        }
        if settings.server_port == 0 {
            settings.server_port = DEFAULT_SERVER_PORT;
        }
        Ok(settings)
    }

    pub fn block_window(&self) -> Duration {
        Duration::from_secs(self.block_time)
    }

    pub fn share_names(&self) -> Vec<String> {
        self.shares.keys().cloned().collect()
    }
}
